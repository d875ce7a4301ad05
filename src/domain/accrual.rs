use super::money::Money;

/// Order status as reported by the external accrual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl OracleStatus {
    /// Maps a wire status string. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "REGISTERED" => Some(Self::Registered),
            "PROCESSING" => Some(Self::Processing),
            "INVALID" => Some(Self::Invalid),
            "PROCESSED" => Some(Self::Processed),
            _ => None,
        }
    }
}

/// Parsed answer for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualReport {
    pub order: String,
    pub status: OracleStatus,
    pub accrual: Option<Money>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_closed() {
        assert_eq!(OracleStatus::parse("PROCESSED"), Some(OracleStatus::Processed));
        assert_eq!(OracleStatus::parse("REGISTERED"), Some(OracleStatus::Registered));
        assert_eq!(OracleStatus::parse("processed"), None);
        assert_eq!(OracleStatus::parse("NEW"), None);
    }
}
