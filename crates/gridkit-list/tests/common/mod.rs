//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use gridkit_core::{
    AggregateFn, ColumnSpec, Domain, FieldKind, GridError, GroupData, KeyValueStore, MemoryKeyValueStore,
    ReadGroupRequest, ReadGroupResponse, RecordData, RecordId, RecordValues, RemoteStore, ResequenceRequest,
    Result, SaveRequest, SaveResponse, SearchReadRequest, SearchReadResponse, Value, ViewConfig, compare_values,
};
use gridkit_list::{ListController, ListState, NullPosition, compare_records};
use tokio::sync::oneshot;

/// In-memory remote store.
///
/// Filters, orders and groups its records the way a real store would, and
/// logs every call. Calls can be made to fail, or held until a test
/// releases them to simulate slow responses.
pub struct MockRemoteStore {
    records: parking_lot::Mutex<Vec<RecordData>>,
    next_id: parking_lot::Mutex<i64>,
    /// Log of all calls ("search_read", "read_group", ...), for assertion in tests
    call_log: parking_lot::Mutex<Vec<String>>,
    save_log: parking_lot::Mutex<Vec<SaveRequest>>,
    resequence_log: parking_lot::Mutex<Vec<ResequenceRequest>>,
    failures: parking_lot::Mutex<HashMap<&'static str, GridError>>,
    gates: parking_lot::Mutex<HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>>,
}

impl MockRemoteStore {
    pub fn new(records: Vec<RecordData>) -> Self {
        let next_id = records.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        Self {
            records: parking_lot::Mutex::new(records),
            next_id: parking_lot::Mutex::new(next_id),
            call_log: parking_lot::Mutex::new(Vec::new()),
            save_log: parking_lot::Mutex::new(Vec::new()),
            resequence_log: parking_lot::Mutex::new(Vec::new()),
            failures: parking_lot::Mutex::new(HashMap::new()),
            gates: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: &'static str, error: GridError) {
        self.failures.lock().insert(op, error);
    }

    /// Hold the next call of `op` until the returned sender fires
    pub fn gate(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().entry(op).or_default().push_back(rx);
        tx
    }

    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    pub fn calls(&self, op: &str) -> usize {
        self.call_log.lock().iter().filter(|c| c.as_str() == op).count()
    }

    pub fn clear_log(&self) {
        self.call_log.lock().clear();
    }

    pub fn save_log(&self) -> Vec<SaveRequest> {
        self.save_log.lock().clone()
    }

    pub fn resequence_log(&self) -> Vec<ResequenceRequest> {
        self.resequence_log.lock().clone()
    }

    pub fn record(&self, id: i64) -> Option<RecordData> {
        self.records.lock().iter().find(|r| r.id.0 == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Log the call, wait for its gate if any, then report a planned failure
    async fn enter(&self, op: &'static str) -> Result<()> {
        self.call_log.lock().push(op.to_string());
        let gate = self.gates.lock().get_mut(op).and_then(|q| q.pop_front());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.failures.lock().remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn matching(&self, domain: &Domain) -> Vec<RecordData> {
        self.records
            .lock()
            .iter()
            .filter(|r| domain.matches(&r.values))
            .cloned()
            .collect()
    }
}

fn aggregate(function: AggregateFn, records: &[&RecordData], field: &str) -> f64 {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get(field).and_then(Value::as_f64))
        .collect();
    match function {
        AggregateFn::Sum => values.iter().sum(),
        AggregateFn::Avg if values.is_empty() => 0.0,
        AggregateFn::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggregateFn::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFn::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFn::Count => records.len() as f64,
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn search_read(&self, request: SearchReadRequest) -> Result<SearchReadResponse> {
        self.enter("search_read").await?;
        let mut records = self.matching(&request.domain);
        records.sort_by(|a, b| compare_records(&a.values, &b.values, &request.order, NullPosition::Last));
        let total = records.len();
        let exact_count = match request.count_limit {
            Some(limit) if total > limit => None,
            _ => Some(total),
        };
        Ok(SearchReadResponse {
            records: records.into_iter().skip(request.offset).take(request.limit).collect(),
            exact_count,
        })
    }

    async fn read_group(&self, request: ReadGroupRequest) -> Result<ReadGroupResponse> {
        self.enter("read_group").await?;
        let records = self.matching(&request.domain);
        let Some(field) = request.group_by.first().cloned() else {
            let members: Vec<&RecordData> = records.iter().collect();
            return Ok(ReadGroupResponse {
                groups: vec![GroupData {
                    value: Value::Null,
                    count: members.len(),
                    aggregates: request
                        .aggregates
                        .iter()
                        .map(|spec| (spec.field.clone(), aggregate(spec.function, &members, &spec.field)))
                        .collect(),
                }],
                exact_group_count: None,
            });
        };

        let mut buckets: BTreeMap<String, (Value, Vec<&RecordData>)> = BTreeMap::new();
        for record in &records {
            let value = record.get(&field).cloned().unwrap_or(Value::Null);
            buckets
                .entry(value.group_key())
                .or_insert_with(|| (value, Vec::new()))
                .1
                .push(record);
        }

        let mut groups: Vec<GroupData> = buckets
            .into_values()
            .map(|(value, members)| GroupData {
                count: members.len(),
                aggregates: request
                    .aggregates
                    .iter()
                    .map(|spec| (spec.field.clone(), aggregate(spec.function, &members, &spec.field)))
                    .collect(),
                value,
            })
            .collect();
        groups.sort_by(|a, b| {
            let descending = request
                .order
                .iter()
                .find(|o| o.field == field)
                .is_some_and(|o| o.direction == gridkit_core::SortDirection::Desc);
            let ordering = compare_values(&a.value, &b.value);
            if descending { ordering.reverse() } else { ordering }
        });

        let total = groups.len();
        Ok(ReadGroupResponse {
            groups: groups.into_iter().skip(request.offset).take(request.limit).collect(),
            exact_group_count: (total > request.limit).then_some(total),
        })
    }

    async fn save(&self, request: SaveRequest) -> Result<SaveResponse> {
        self.enter("save").await?;
        self.save_log.lock().push(request.clone());
        let mut ids = Vec::with_capacity(request.ids.len());
        let mut records = self.records.lock();
        for id in &request.ids {
            if id.is_virtual() {
                let mut next_id = self.next_id.lock();
                let new_id = RecordId(*next_id);
                *next_id += 1;
                records.push(RecordData {
                    id: new_id,
                    values: request.patch.clone(),
                });
                ids.push(new_id);
                continue;
            }
            let record = records
                .iter_mut()
                .find(|r| r.id == *id)
                .ok_or_else(|| GridError::NotFound(format!("record {}", id)))?;
            record
                .values
                .extend(request.patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            ids.push(*id);
        }
        Ok(SaveResponse { ids })
    }

    async fn resequence(&self, request: ResequenceRequest) -> Result<()> {
        self.enter("resequence").await?;
        self.resequence_log.lock().push(request.clone());
        let mut records = self.records.lock();
        for (i, id) in request.ids.iter().enumerate() {
            if let Some(record) = records.iter_mut().find(|r| r.id == *id) {
                record
                    .values
                    .insert(request.field.clone(), Value::Integer(request.offset + i as i64));
            }
        }
        Ok(())
    }

    async fn search_count(&self, _model: &str, domain: &Domain) -> Result<usize> {
        self.enter("search_count").await?;
        Ok(self.matching(domain).len())
    }
}

// ============ Fixtures ============

pub fn values(pairs: &[(&str, Value)]) -> RecordValues {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// The "foo" model used across the tests: four records, two per `bar` value
pub fn foo_records() -> Vec<RecordData> {
    vec![
        RecordData::new(
            1,
            [
                ("foo", Value::from("yop")),
                ("bar", Value::Bool(true)),
                ("int_field", Value::Integer(10)),
                ("qux", Value::Float(0.4)),
                ("sequence", Value::Integer(1)),
            ],
        ),
        RecordData::new(
            2,
            [
                ("foo", Value::from("blip")),
                ("bar", Value::Bool(true)),
                ("int_field", Value::Integer(9)),
                ("qux", Value::Float(13.0)),
                ("sequence", Value::Integer(2)),
            ],
        ),
        RecordData::new(
            3,
            [
                ("foo", Value::from("gnap")),
                ("bar", Value::Bool(true)),
                ("int_field", Value::Integer(17)),
                ("qux", Value::Float(-3.0)),
                ("sequence", Value::Integer(3)),
            ],
        ),
        RecordData::new(
            4,
            [
                ("foo", Value::from("blip")),
                ("bar", Value::Bool(false)),
                ("int_field", Value::Integer(-4)),
                ("qux", Value::Float(9.0)),
                ("sequence", Value::Integer(4)),
            ],
        ),
    ]
}

pub fn foo_config() -> ViewConfig {
    ViewConfig::new(
        "foo",
        vec![
            ColumnSpec::new("sequence", FieldKind::Handle),
            ColumnSpec::new("foo", FieldKind::Char).required(),
            ColumnSpec::new("bar", FieldKind::Boolean),
            ColumnSpec::new("int_field", FieldKind::Integer).with_aggregate(AggregateFn::Sum),
            ColumnSpec::new("qux", FieldKind::Float),
        ],
    )
}

pub struct Harness {
    pub store: Arc<MockRemoteStore>,
    pub preferences: Arc<MemoryKeyValueStore>,
    pub list: ListController,
}

pub fn harness(config: ViewConfig, records: Vec<RecordData>) -> Harness {
    harness_with_preferences(config, records, Arc::new(MemoryKeyValueStore::new()))
}

pub fn harness_with_preferences(
    config: ViewConfig,
    records: Vec<RecordData>,
    preferences: Arc<MemoryKeyValueStore>,
) -> Harness {
    let store = Arc::new(MockRemoteStore::new(records));
    let state = ListState::new(config, preferences.clone() as Arc<dyn KeyValueStore>)
        .expect("valid view configuration");
    let list = ListController::new(store.clone() as Arc<dyn RemoteStore>, state);
    Harness {
        store,
        preferences,
        list,
    }
}

/// Ids of the displayed records, in order
pub fn visible_ids(list: &ListController) -> Vec<i64> {
    list.state().tree().visible_records().into_iter().map(|id| id.0).collect()
}
