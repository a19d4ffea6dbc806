//! Request kinds and verbs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The remote operation a queued request replays through.
///
/// Unknown names parse to [`RequestKind::Http`], which replays the request's
/// method, endpoint, and payload verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    #[serde(alias = "donation-create")]
    Donation,
    VolunteerRegister,
    #[serde(alias = "hazard-report-submit")]
    ReportSubmit,
    ContactCreate,
    ContactUpdate,
    ContactDelete,
    DrillCreate,
    DrillUpdate,
    DrillDelete,
    #[serde(other)]
    Http,
}

impl RequestKind {
    pub const ALL: [Self; 10] = [
        Self::Donation,
        Self::VolunteerRegister,
        Self::ReportSubmit,
        Self::ContactCreate,
        Self::ContactUpdate,
        Self::ContactDelete,
        Self::DrillCreate,
        Self::DrillUpdate,
        Self::DrillDelete,
        Self::Http,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Donation => "donation",
            Self::VolunteerRegister => "volunteer-register",
            Self::ReportSubmit => "report-submit",
            Self::ContactCreate => "contact-create",
            Self::ContactUpdate => "contact-update",
            Self::ContactDelete => "contact-delete",
            Self::DrillCreate => "drill-create",
            Self::DrillUpdate => "drill-update",
            Self::DrillDelete => "drill-delete",
            Self::Http => "http",
        }
    }

    /// Parse a stored kind name, falling back to the generic HTTP replay.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "donation" | "donation-create" => Self::Donation,
            "volunteer-register" => Self::VolunteerRegister,
            "report-submit" | "hazard-report-submit" => Self::ReportSubmit,
            "contact-create" => Self::ContactCreate,
            "contact-update" => Self::ContactUpdate,
            "contact-delete" => Self::ContactDelete,
            "drill-create" => Self::DrillCreate,
            "drill-update" => Self::DrillUpdate,
            "drill-delete" => Self::DrillDelete,
            _ => Self::Http,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

/// HTTP verb intent of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether requests with this verb address an existing resource by id.
    #[must_use]
    pub const fn targets_existing(self) -> bool {
        matches!(self, Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unsupported mutation method: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_roundtrip() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::from_name(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_kind_falls_back_to_http() {
        assert_eq!(RequestKind::from_name("shelter-checkin"), RequestKind::Http);
        let parsed: RequestKind = serde_json::from_str("\"shelter-checkin\"").unwrap();
        assert_eq!(parsed, RequestKind::Http);
    }

    #[test]
    fn kind_aliases_are_accepted() {
        assert_eq!(
            RequestKind::from_name("hazard-report-submit"),
            RequestKind::ReportSubmit
        );
        assert_eq!(RequestKind::from_name("Donation-Create"), RequestKind::Donation);
        assert_eq!(
            serde_json::to_string(&RequestKind::VolunteerRegister).unwrap(),
            "\"volunteer-register\""
        );
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("GET".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Delete.targets_existing());
        assert!(!HttpMethod::Post.targets_existing());
    }
}
