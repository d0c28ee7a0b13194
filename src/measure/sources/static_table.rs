//! Offline sources built from fixed reference rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::stable_hash_u64;
use crate::measure::error::MeasureResult;
use crate::measure::id::stable_local_id;
use crate::measure::source::{FetchContext, MeasureFetcher};
use crate::measure::{AttributeValue, Measure};

/// How a row derives its local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalKey {
    /// The row's own numeric key, e.g. a metro code.
    Natural(i64),
    /// A textual key hashed into the local id space.
    Hashed(String),
}

impl LocalKey {
    pub fn local_id(&self) -> i64 {
        match self {
            LocalKey::Natural(id) => *id,
            LocalKey::Hashed(key) => stable_local_id(key),
        }
    }
}

/// One reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRow {
    pub key: LocalKey,
    pub display_name: String,
    pub measure_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub attributes: Vec<(String, AttributeValue)>,
}

impl StaticRow {
    pub fn natural(local_id: i64, measure_type: &str, display_name: impl Into<String>) -> Self {
        Self::with_key(LocalKey::Natural(local_id), measure_type, display_name)
    }

    pub fn hashed(
        key: impl Into<String>,
        measure_type: &str,
        display_name: impl Into<String>,
    ) -> Self {
        Self::with_key(LocalKey::Hashed(key.into()), measure_type, display_name)
    }

    fn with_key(key: LocalKey, measure_type: &str, display_name: impl Into<String>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            measure_type: measure_type.to_string(),
            sub_type: None,
            attributes: Vec::new(),
        }
    }

    pub fn sub_type(mut self, sub_type: &str) -> Self {
        self.sub_type = Some(sub_type.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }
}

/// A named list of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticTable {
    pub name: String,
    #[serde(default)]
    pub data_provider: Option<String>,
    pub rows: Vec<StaticRow>,
}

impl StaticTable {
    pub fn new(name: impl Into<String>, rows: Vec<StaticRow>) -> Self {
        Self {
            name: name.into(),
            data_provider: None,
            rows,
        }
    }

    pub fn with_data_provider(mut self, provider: impl Into<String>) -> Self {
        self.data_provider = Some(provider.into());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Hex digest of the rows and data provider. Equal tables share it.
    pub fn fingerprint(&self) -> String {
        let encoded = format!("{:?}|{:?}", self.data_provider, self.rows);
        format!("{:016x}", stable_hash_u64(&encoded))
    }
}

/// Turns a [`StaticTable`] into measures.
#[derive(Debug, Clone)]
pub struct StaticTableFetcher {
    table: StaticTable,
}

impl StaticTableFetcher {
    pub fn new(table: StaticTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StaticTable {
        &self.table
    }
}

#[async_trait]
impl MeasureFetcher for StaticTableFetcher {
    async fn fetch(&self, ctx: &FetchContext<'_>) -> MeasureResult<Vec<Measure>> {
        self.table
            .rows
            .iter()
            .map(|row| -> MeasureResult<Measure> {
                let mut measure = Measure::new(
                    ctx.measure_id(row.key.local_id())?,
                    ctx.network(),
                    row.measure_type.as_str(),
                    row.display_name.as_str(),
                );
                measure.sub_type = row.sub_type.clone();
                measure.data_provider = self.table.data_provider.clone();
                measure.attributes.extend(row.attributes.iter().cloned());
                Ok(measure)
            })
            .collect()
    }
}
