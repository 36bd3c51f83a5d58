#![allow(dead_code)]

use stick_dispatch::{Controller, Kernel, KernelConfig, Output, ParamSpec};

/// Scoped fmt subscriber writing through the test harness' capture.
pub struct TestTracing {
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter("stick_dispatch=debug")
            .with_test_writer()
            .finish();
        Self {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}

pub fn kernel() -> Kernel {
    Kernel::new(KernelConfig::default())
}

pub fn debug_kernel() -> Kernel {
    Kernel::new(KernelConfig {
        debug: true,
        ..KernelConfig::default()
    })
}

/// Controller answering with a fixed string.
pub fn text(name: &str, body: &'static str) -> Controller {
    Controller::new(name, Vec::new(), move |_| Ok(Output::from(body)))
}

/// Controller greeting its `name` parameter.
pub fn hello() -> Controller {
    Controller::new("hello", vec![ParamSpec::string("name")], |inv| {
        let name = inv.args.str(0).unwrap_or("nobody").to_string();
        Ok(format!("Hello {name}").into())
    })
}
