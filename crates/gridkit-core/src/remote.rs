//! Remote store trait
//!
//! The list view talks to the remote collection store through a handful of
//! verbs. Transport and wire format are the implementor's business.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AggregateFn, Domain, FieldName, OrderSpec, RecordData, RecordId, RecordValues, Result, Value};

/// Extra key/values forwarded to the store with every write
pub type RpcContext = BTreeMap<String, serde_json::Value>;

/// Request for one window of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReadRequest {
    pub model: String,
    pub domain: Domain,
    pub fields: Vec<FieldName>,
    pub order: Vec<OrderSpec>,
    pub offset: usize,
    pub limit: usize,
    /// Stop counting matches beyond this number
    pub count_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchReadResponse {
    pub records: Vec<RecordData>,
    /// Exact number of matching records.
    ///
    /// `None` means counting stopped: at least `count_limit` records match.
    pub exact_count: Option<usize>,
}

/// Aggregate requested from `read_group`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub field: FieldName,
    pub function: AggregateFn,
}

/// Request for one level of groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadGroupRequest {
    pub model: String,
    pub domain: Domain,
    /// Group-by fields; the response groups by the first one only
    pub group_by: Vec<FieldName>,
    pub aggregates: Vec<AggregateSpec>,
    pub order: Vec<OrderSpec>,
    pub offset: usize,
    pub limit: usize,
}

/// One group returned by `read_group`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupData {
    pub value: Value,
    pub count: usize,
    #[serde(default)]
    pub aggregates: BTreeMap<FieldName, f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadGroupResponse {
    pub groups: Vec<GroupData>,
    /// Total number of groups when more than `limit` exist
    pub exact_group_count: Option<usize>,
}

/// Batch write of one patch to one or many records.
///
/// Virtual ids ask the store to create the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub model: String,
    pub ids: Vec<RecordId>,
    pub patch: RecordValues,
    #[serde(default)]
    pub context: RpcContext,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaveResponse {
    /// Persisted ids, in request order (virtual ids replaced by real ones)
    pub ids: Vec<RecordId>,
}

/// Persist a new manual order for a contiguous range of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResequenceRequest {
    pub model: String,
    pub ids: Vec<RecordId>,
    /// Sequence value given to the first id; the following ids get `offset + i`
    pub offset: i64,
    pub field: FieldName,
    #[serde(default)]
    pub context: RpcContext,
}

/// The remote collection store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read one window of records matching a domain
    async fn search_read(&self, request: SearchReadRequest) -> Result<SearchReadResponse>;

    /// Read one level of groups with their counts and aggregates.
    ///
    /// With an empty `group_by` the store answers with a single group
    /// holding the count and aggregates of the whole domain.
    async fn read_group(&self, request: ReadGroupRequest) -> Result<ReadGroupResponse>;

    /// Write one patch to all given records
    async fn save(&self, request: SaveRequest) -> Result<SaveResponse>;

    /// Persist a manual order
    async fn resequence(&self, request: ResequenceRequest) -> Result<()>;

    /// Count every record matching a domain
    async fn search_count(&self, model: &str, domain: &Domain) -> Result<usize>;
}
