//! Shared test utilities for the tablemap workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A synthetic remote table API server
//! - Row generators and geobuf cell encoding
//! - Source descriptors paired with the tables they read
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then start a server in an async test:
//!
//! ```ignore
//! use test_utils::{MockTableServer, MockTable, sequential_rows};
//!
//! let server = MockTableServer::start().await;
//! server.add_table("t", MockTable::new("v1", &["id", "name"]).with_rows(sequential_rows(3)));
//! ```

pub mod fixtures;
pub mod generators;
pub mod mock_api;

pub use fixtures::*;
pub use generators::*;
pub use mock_api::*;

/// Macro for approximate equality of two positions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_position_approx_eq;
///
/// assert_position_approx_eq!(vec![1.0000001, 2.0], vec![1.0, 2.0], 1e-6);
/// ```
#[macro_export]
macro_rules! assert_position_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: &[f64] = &$left;
        let right: &[f64] = &$right;
        let epsilon: f64 = $epsilon;
        assert_eq!(left.len(), right.len(), "position dimensions differ");
        for (axis, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if (l - r).abs() > epsilon {
                panic!(
                    "assertion failed: positions differ on axis {}\n  left: `{:?}`,\n right: `{:?}`",
                    axis, left, right
                );
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_approx_eq_passes() {
        assert_position_approx_eq!(vec![1.0000001, 2.0], vec![1.0, 2.0], 1e-6);
    }

    #[test]
    #[should_panic(expected = "positions differ on axis 1")]
    fn test_position_approx_eq_fails() {
        assert_position_approx_eq!(vec![1.0, 2.1], vec![1.0, 2.0], 1e-6);
    }

    #[tokio::test]
    async fn test_mock_server_pages_rows() {
        let server = MockTableServer::start().await;
        server.add_table(
            "t",
            MockTable::new("v1", &["id", "name"]).with_rows(sequential_rows(5)),
        );

        let url = format!(
            "{}/tables/t/rows?selectedVariables=name,id&maxResults=2&startIndex=2",
            server.base_url()
        );
        let body = reqwest::get(url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "[\"row-2\",2]\n[\"row-3\",3]");
        assert_eq!(server.row_requests(), 1);
        assert_eq!(server.version_requests(), 0);
    }
}
