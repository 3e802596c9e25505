use crate::error::StoreError;
use async_trait::async_trait;
use model::{
    core::error::ConfigError,
    pagination::{
        cursor::ContinuationToken,
        descriptor::{QueryDescriptor, ScanDescriptor},
        page::Page,
    },
    records::batch::{BatchGetOutput, BatchGetRequest},
};
use std::fmt::Debug;

/// Read side of the store: one request, one page.
///
/// Implementations issue exactly one request per call. Following the
/// continuation token is left to the caller.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn scan(&self, request: &ScanDescriptor) -> Result<Page, StoreError>;

    async fn query(&self, request: &QueryDescriptor) -> Result<Page, StoreError>;

    async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetOutput, StoreError>;
}

/// A paginated read that can be re-issued from a continuation token.
///
/// Scans and queries share all iteration logic through this trait.
#[async_trait]
pub trait PageRequest: Clone + Debug + Send + Sync + 'static {
    fn table(&self) -> &str;

    fn limit(&self) -> Option<usize>;

    fn set_limit(&mut self, limit: Option<usize>);

    fn start_key(&self) -> Option<&ContinuationToken>;

    fn set_start_key(&mut self, token: Option<ContinuationToken>);

    fn validate(&self) -> Result<(), ConfigError>;

    async fn fetch(&self, source: &dyn PageSource) -> Result<Page, StoreError>;
}

#[async_trait]
impl PageRequest for ScanDescriptor {
    fn table(&self) -> &str {
        &self.table
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    fn start_key(&self) -> Option<&ContinuationToken> {
        self.start_key.as_ref()
    }

    fn set_start_key(&mut self, token: Option<ContinuationToken>) {
        self.start_key = token;
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ScanDescriptor::validate(self)
    }

    async fn fetch(&self, source: &dyn PageSource) -> Result<Page, StoreError> {
        source.scan(self).await
    }
}

#[async_trait]
impl PageRequest for QueryDescriptor {
    fn table(&self) -> &str {
        &self.table
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    fn start_key(&self) -> Option<&ContinuationToken> {
        self.start_key.as_ref()
    }

    fn set_start_key(&mut self, token: Option<ContinuationToken>) {
        self.start_key = token;
    }

    fn validate(&self) -> Result<(), ConfigError> {
        QueryDescriptor::validate(self)
    }

    async fn fetch(&self, source: &dyn PageSource) -> Result<Page, StoreError> {
        source.query(self).await
    }
}
