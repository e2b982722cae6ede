//! Bounded-wait wrapper around another actuator

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::types::{Confirmation, MotionCommand};

use super::{Actuator, ActuatorError};

/// Fails a command that is not confirmed within the timeout
pub struct BoundedActuator {
    inner: Arc<dyn Actuator>,
    timeout: Duration,
}

impl BoundedActuator {
    pub fn new(inner: Arc<dyn Actuator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Actuator for BoundedActuator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn apply(&self, command: &MotionCommand) -> Result<Confirmation, ActuatorError> {
        match tokio::time::timeout(self.timeout, self.inner.apply(command)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(command = %command, timeout_ms, "Actuator confirmation timed out");
                Err(ActuatorError::Timeout { timeout_ms })
            }
        }
    }

    async fn reset(&self) -> Result<(), ActuatorError> {
        self.inner.reset().await
    }
}
