use serde_json::{json, Map, Value};

use crate::controller::{Controller, Output};

/// Controller that answers with a JSON description of what it was called
/// with. The CLI installs it as the fallback so string references resolve
/// without any application code.
#[must_use]
pub fn echo_controller() -> Controller {
    Controller::new("echo", Vec::new(), |inv| {
        let ctx = inv.context;
        let params: Map<String, Value> = ctx.route_values().into_iter().collect();
        Ok(Output::Value(json!({
            "controller": ctx.controller.as_ref().map(|c| c.describe()),
            "route": ctx.route.as_ref().map(|m| m.route.pattern.clone()),
            "method": ctx.request.method.as_str(),
            "path": ctx.request.path,
            "params": params,
            "query": ctx.request.query,
            "body": ctx.request.body,
        })))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernel::Kernel;

    #[test]
    fn test_echo_describes_request() {
        let kernel = Kernel::new(KernelConfig::default());
        kernel.fallback_controller(echo_controller());
        kernel.route("GET /users/@id", "Users->show").unwrap();

        let response = kernel.mock("GET /users/7?full=1");
        assert_eq!(response.status, 200);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["controller"], "Users->show");
        assert_eq!(body["params"]["id"], "7");
        assert_eq!(body["query"]["full"], "1");
    }
}
