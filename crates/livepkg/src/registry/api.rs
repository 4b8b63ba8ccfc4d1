//! Feed API types
//!
//! Response types for the flat-container and search endpoints.

use serde::{Deserialize, Serialize};

/// Published versions of a package
///
/// Response from GET {base}/{id}/index.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionIndex {
    /// Version strings, oldest first
    pub versions: Vec<String>,
}

/// Search endpoint response
///
/// Response from GET {search}?q=..
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Total number of matching packages
    #[serde(default)]
    pub total_hits: u64,

    /// Matches for the requested page
    #[serde(default)]
    pub data: Vec<SearchResult>,
}

/// One package in a search response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Package identifier
    pub id: String,

    /// Latest version
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_downloads: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_version_index() {
        let json = r#"{ "versions": ["1.0.0", "1.1.0-beta", "2.0.0"] }"#;
        let index: VersionIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.versions.len(), 3);
    }

    #[test]
    fn test_deserialize_search_response() {
        let json = r#"{
            "totalHits": 2,
            "data": [
                { "id": "Newtonsoft.Json", "version": "13.0.3", "totalDownloads": 5000 },
                { "id": "Newtonsoft.Json.Bson", "version": "1.0.2", "description": "BSON" }
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.total_hits, 2);
        assert_eq!(response.data[0].id, "Newtonsoft.Json");
        assert_eq!(response.data[0].total_downloads, Some(5000));
        assert_eq!(response.data[1].description.as_deref(), Some("BSON"));
    }
}
