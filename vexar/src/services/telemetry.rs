//! Analytics events recorded as structured tracing events

use std::collections::HashMap;

use shared::{Component, component_debug, component_info};

use crate::traits::Telemetry;

pub struct TracingTelemetry {
    enabled: bool,
    user_id: String,
}

impl TracingTelemetry {
    pub fn new(enabled: bool, user_id: impl Into<String>) -> Self {
        Self {
            enabled,
            user_id: user_id.into(),
        }
    }
}

impl Telemetry for TracingTelemetry {
    fn send_event(&self, event_name: &str, parameters: HashMap<String, String>) {
        if !self.enabled {
            component_debug!(Component::App, "Analytics disabled, dropping {}", event_name);
            return;
        }
        component_info!(
            Component::App,
            user_id = %self.user_id,
            event = event_name,
            ?parameters,
            "📈 {}",
            event_name
        );
    }
}
