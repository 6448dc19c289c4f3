use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Status,
    Transition,
    Fault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub state: String,
    pub msg: String,
    // Countdown shown while the wind stage travels, "0.00" otherwise
    pub countdown: String,
    // Axis readbacks, when available
    pub alt_pos: Option<f64>,
    pub wind_pos: Option<f64>,
    pub fault: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_fault_event() {
        let ev = StatusEvent {
            ts_unix_ms: 1,
            kind: EventKind::Fault,
            state: "FAULT".into(),
            msg: "await_alt timed out".into(),
            countdown: "0.00".into(),
            alt_pos: Some(6.5),
            wind_pos: None,
            fault: Some("await_alt timed out after 45000 ms".into()),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"kind\":\"Fault\""));
        assert!(json.contains("\"wind_pos\":null"));
    }
}
