/*! Bookkeeping for the downstream scrape of each cluster. */

use std::str::FromStr;

use crate::error::GeoCoverError;

/// Where a cluster is in the downstream search and scrape workflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ScrapeStatus {
    /// Not yet picked up, the state of every freshly generated cluster.
    Pending,
    /// A worker has claimed the cluster.
    Processing,
    Completed,
    Failed,
}

impl ScrapeStatus {
    /// The name stored in the database.
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub(crate) fn parse(txt: &str) -> Result<Self, GeoCoverError> {
        Self::from_str(txt).map_err(|_| GeoCoverError::InvalidStatus(txt.to_owned()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(ScrapeStatus::Pending.name(), "pending");
        assert_eq!(ScrapeStatus::Processing.name(), "processing");
        assert_eq!(ScrapeStatus::Completed.to_string(), "completed");
        assert_eq!(ScrapeStatus::Failed.name(), "failed");
    }

    #[test]
    fn test_parse() {
        assert_eq!(ScrapeStatus::parse("failed").unwrap(), ScrapeStatus::Failed);
        assert!(matches!(
            ScrapeStatus::parse("queued"),
            Err(GeoCoverError::InvalidStatus(_))
        ));
    }
}
