use serde::{Deserialize, Serialize};

/// Events emitted while the session comes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartupEvent {
    /// A pipeline stage has started.
    StageStarted { stage: String },
    /// A pipeline stage has completed; the next one starts right after.
    StageFinished { stage: String },
    /// A milestone was sent to the splash screen.
    StageAnnounced { stage: String },
    /// Every stage has completed.
    Ready,
}

impl StartupEvent {
    /// Name of the stage the event is about, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageStarted { stage }
            | Self::StageFinished { stage }
            | Self::StageAnnounced { stage } => Some(stage),
            Self::Ready => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = StartupEvent::StageFinished {
            stage: "phase-0".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage_finished");
        assert_eq!(json["stage"], "phase-0");

        let ready = serde_json::to_string(&StartupEvent::Ready).unwrap();
        assert_eq!(ready, r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_event_stage() {
        let event = StartupEvent::StageAnnounced {
            stage: "ksmserver".to_string(),
        };
        assert_eq!(event.stage(), Some("ksmserver"));
        assert_eq!(StartupEvent::Ready.stage(), None);
    }
}
