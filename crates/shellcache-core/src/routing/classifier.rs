//! Request classification

use serde::Serialize;
use std::fmt;

use super::pattern::UrlPattern;
use crate::error::CoreError;
use crate::request::InterceptedRequest;

/// Handling strategy for an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// App shell, scripts, stylesheets, icons, third-party bundles
    StaticAsset,
    /// Responses from the external weather-data APIs
    DynamicData,
    /// Top-level document loads
    Navigation,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::StaticAsset => "static_asset",
            RequestClass::DynamicData => "dynamic_data",
            RequestClass::Navigation => "navigation",
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps requests to a [`RequestClass`]
///
/// Predicates are checked in a fixed order and the first match wins:
/// dynamic-data patterns, then navigation intent, then the static default.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    dynamic: Vec<UrlPattern>,
}

impl RequestClassifier {
    pub fn new<S: AsRef<str>>(dynamic_patterns: &[S]) -> Result<Self, CoreError> {
        let dynamic = dynamic_patterns
            .iter()
            .map(|p| UrlPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { dynamic })
    }

    pub fn classify(&self, request: &InterceptedRequest) -> RequestClass {
        if self.dynamic.iter().any(|p| p.matches_url(&request.url)) {
            RequestClass::DynamicData
        } else if request.navigate {
            RequestClass::Navigation
        } else {
            RequestClass::StaticAsset
        }
    }
}
