use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::traits::scroller::{RequestTemplate, Scroller};
use crate::traits::transport::RestRequest;

/// Outcome of checking a downloaded page against the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVerdict {
    /// A new page: process it and continue
    New,
    /// Identical to the preceding page: stop paginating
    Duplicate,
}

/// Hex SHA-256 of the serialized response body.
pub fn page_hash(response: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(response).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}

/// Request sequence of one running job.
///
/// Owns the job's scroller and the hash of the last accepted page; neither
/// is ever shared with another job.
pub struct PaginationDriver {
    scroller: Box<dyn Scroller>,
    last_page_hash: Option<String>,
}

impl PaginationDriver {
    pub fn new(scroller: Box<dyn Scroller>) -> Self {
        Self {
            scroller,
            last_page_hash: None,
        }
    }

    pub fn first_request(&mut self, template: &RequestTemplate) -> Option<RestRequest> {
        self.scroller.first_request(template)
    }

    /// Compare `response` with the previous page.
    ///
    /// A duplicate resets the scroller and leaves the stored hash alone;
    /// a new page replaces the stored hash.
    pub fn check_page(&mut self, response: &Value) -> PageVerdict {
        let hash = page_hash(response);
        if self.last_page_hash.as_deref() == Some(hash.as_str()) {
            self.scroller.reset();
            return PageVerdict::Duplicate;
        }
        self.last_page_hash = Some(hash);
        PageVerdict::New
    }

    pub fn next_request(
        &mut self,
        template: &RequestTemplate,
        response: &Value,
        data: &[Value],
    ) -> Option<RestRequest> {
        self.scroller.next_request(template, response, data)
    }

    pub fn last_page_hash(&self) -> Option<&str> {
        self.last_page_hash.as_deref()
    }
}

impl std::fmt::Debug for PaginationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationDriver")
            .field("last_page_hash", &self.last_page_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestMethod;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Never signals completion; counts resets.
    struct EndlessScroller {
        resets: Arc<AtomicUsize>,
    }

    impl Scroller for EndlessScroller {
        fn first_request(&mut self, template: &RequestTemplate) -> Option<RestRequest> {
            Some(template.request())
        }

        fn next_request(
            &mut self,
            template: &RequestTemplate,
            _response: &Value,
            _data: &[Value],
        ) -> Option<RestRequest> {
            Some(template.request())
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn template() -> RequestTemplate {
        RequestTemplate {
            job_id: "items".to_string(),
            endpoint: "items".to_string(),
            method: RequestMethod::Get,
            params: Map::new(),
        }
    }

    #[test]
    fn test_page_hash_is_stable() {
        let a = page_hash(&json!({"items": [1, 2]}));
        assert_eq!(a, page_hash(&json!({"items": [1, 2]})));
        assert_ne!(a, page_hash(&json!({"items": [1, 3]})));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_duplicate_page_resets_scroller() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut driver = PaginationDriver::new(Box::new(EndlessScroller {
            resets: resets.clone(),
        }));
        let template = template();

        assert!(driver.first_request(&template).is_some());
        let page = json!([{"id": 1}]);
        assert_eq!(driver.check_page(&page), PageVerdict::New);
        assert!(driver.next_request(&template, &page, &[]).is_some());
        assert_eq!(driver.check_page(&page), PageVerdict::Duplicate);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_consecutive_pages_compared() {
        let mut driver = PaginationDriver::new(Box::new(EndlessScroller {
            resets: Arc::new(AtomicUsize::new(0)),
        }));
        let a = json!([{"id": 1}]);
        let b = json!([{"id": 2}]);

        assert_eq!(driver.check_page(&a), PageVerdict::New);
        assert_eq!(driver.check_page(&b), PageVerdict::New);
        assert_eq!(driver.check_page(&a), PageVerdict::New);
        assert_eq!(driver.last_page_hash(), Some(page_hash(&a).as_str()));
    }
}
