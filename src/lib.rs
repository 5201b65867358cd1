pub mod config;
pub mod coordination;
pub mod domain {
    pub mod payment;
    pub mod processor;
}
pub mod gateways;
pub mod health {
    pub mod monitor;
    pub mod selection;
}
pub mod http {
    pub mod handlers {
        pub mod ops;
        pub mod payments;
    }
    pub mod router;
}
pub mod queue;
pub mod service {
    pub mod forwarder;
    pub mod payment_service;
    pub mod worker;
}
pub mod settlement;
pub mod telemetry;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub monitor: health::monitor::HealthMonitor,
    pub metrics: telemetry::PipelineMetrics,
    pub coordination: Arc<dyn coordination::CoordinationStore>,
}
