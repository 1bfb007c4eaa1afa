//! Microphone access policy for hosts without an interactive permission prompt.

use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, warn};
use voxlink_core::{SessionError, SessionResult, voice::MicrophoneAccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophonePolicy {
    Granted,
    Denied,
}

impl FromStr for MicrophonePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "granted" | "allow" => Ok(MicrophonePolicy::Granted),
            "denied" | "deny" => Ok(MicrophonePolicy::Denied),
            other => Err(other.to_string()),
        }
    }
}

/// Answers permission requests from a fixed, configured policy.
#[derive(Debug, Clone)]
pub struct ConfiguredMicrophone {
    policy: MicrophonePolicy,
}

impl ConfiguredMicrophone {
    pub fn new(policy: MicrophonePolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl MicrophoneAccess for ConfiguredMicrophone {
    async fn request_permission(&self) -> SessionResult<()> {
        match self.policy {
            MicrophonePolicy::Granted => {
                debug!("Microphone access granted by policy.");
                Ok(())
            }
            MicrophonePolicy::Denied => {
                warn!("Microphone access denied by policy.");
                Err(SessionError::PermissionDenied(
                    "microphone access is disabled (MICROPHONE_ACCESS=denied)".to_string(),
                ))
            }
        }
    }
}
