//! Named, ordered command sequences

use serde::{Deserialize, Serialize};

use crate::step::{StepError, StepKind, StepRecord};

/// A saved request: an alias plus the records to run in order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Request {
    #[serde(alias = "Alias")]
    pub alias: String,

    #[serde(default, alias = "Steps")]
    pub steps: Vec<StepRecord>,
}

impl Request {
    pub fn new(alias: impl Into<String>, steps: Vec<StepRecord>) -> Self {
        Self {
            alias: alias.into(),
            steps,
        }
    }

    /// True iff any record is a device command
    pub fn requires_device(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.step_kind() == Some(StepKind::DeviceCommand))
    }

    /// Report the first record that would be skipped at run time
    pub fn validate(&self) -> Result<(), (usize, StepError)> {
        for (index, record) in self.steps.iter().enumerate() {
            record.parse().map_err(|e| (index, e))?;
        }
        Ok(())
    }

    /// One-line tooltip of the form `type: value; type: value`
    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{}: {}", s.kind, s.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Find a request by exact alias
pub fn find_request<'a>(requests: &'a [Request], alias: &str) -> Option<&'a Request> {
    requests.iter().find(|r| r.alias == alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull_logs() -> Request {
        Request::new(
            "pull logs",
            vec![
                StepRecord::shell("echo start"),
                StepRecord::device("adb -s {dev} pull /sdcard/log {local_dir}", true),
                StepRecord::delay(100),
            ],
        )
    }

    #[test]
    fn test_requires_device() {
        assert!(pull_logs().requires_device());

        let local = Request::new("local", vec![StepRecord::shell("ls")]);
        assert!(!local.requires_device());
    }

    #[test]
    fn test_validate_reports_first_bad_step() {
        let mut request = pull_logs();
        assert!(request.validate().is_ok());

        request.steps.push(StepRecord {
            kind: "script".into(),
            value: "x".into(),
            local_dir: None,
        });
        request.steps.push(StepRecord::shell(""));

        let (index, err) = request.validate().unwrap_err();
        assert_eq!(index, 3);
        assert!(matches!(err, StepError::UnknownKind(_)));
    }

    #[test]
    fn test_summary() {
        let request = Request::new(
            "r",
            vec![StepRecord::shell("echo hi"), StepRecord::delay(5)],
        );
        assert_eq!(request.summary(), "command: echo hi; delay: 5");
    }

    #[test]
    fn test_find_request() {
        let requests = vec![pull_logs(), Request::new("reboot", vec![])];
        assert_eq!(find_request(&requests, "reboot").map(|r| r.steps.len()), Some(0));
        assert!(find_request(&requests, "Reboot").is_none());
    }

    #[test]
    fn test_reads_pascal_case_request() {
        let json = r#"{"Alias":"r","Steps":[{"Type":"delay","Value":"10"}]}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(request.alias, "r");
        assert_eq!(request.steps, vec![StepRecord::delay(10)]);
    }
}
