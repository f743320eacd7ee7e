//! Shape samples and values as JSON records with configurable field names.
//!
//! Callers that embed cached values in larger documents may want fields other than the defaults
//! (`timestamp`, `value`, and `_page`). The names are fixed once in [Keys] (usually through
//! [crate::Config]) and never consulted by the caching logic itself.
//!
//! Timestamps are encoded as milliseconds since the Unix epoch and page info as
//! `{"id": <u64>, "version": <u64>}`.
//!
//! # Example
//!
//! ```rust
//! use commonware_timeseries::{Keys, PageInfo, Timestamp, Value};
//!
//! let keys = Keys {
//!     timestamp: "time".into(),
//!     value: "data".into(),
//!     page_info: "metadata".into(),
//! };
//! let value = Value {
//!     timestamp: Timestamp::from_millis(1_000),
//!     value: 42,
//!     page: PageInfo { id: 1, version: 1 },
//! };
//! let record = keys.encode(&value).unwrap();
//! assert_eq!(record["time"], 1_000);
//! assert_eq!(record["data"], 42);
//! assert_eq!(keys.decode_page_info(&record), Some(value.page));
//! ```

use crate::{Error, PageInfo, Sample, Timestamp, Value};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value as Json};

const ID: &str = "id";
const VERSION: &str = "version";

/// Field names used for records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keys {
    pub timestamp: String,
    pub value: String,
    pub page_info: String,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".into(),
            value: "value".into(),
            page_info: "_page".into(),
        }
    }
}

impl Keys {
    /// Encode a [Value] returned by the cache as a JSON object.
    pub fn encode<V: Serialize>(&self, value: &Value<V>) -> Result<Json, Error> {
        let mut page = Map::new();
        page.insert(ID.into(), value.page.id.into());
        page.insert(VERSION.into(), value.page.version.into());

        let mut record = Map::new();
        record.insert(self.timestamp.clone(), value.timestamp.as_millis().into());
        record.insert(self.value.clone(), serde_json::to_value(&value.value)?);
        record.insert(self.page_info.clone(), Json::Object(page));
        Ok(Json::Object(record))
    }

    /// Encode a [Sample] as a JSON object (without page info).
    pub fn encode_sample<V: Serialize>(&self, sample: &Sample<V>) -> Result<Json, Error> {
        let mut record = Map::new();
        record.insert(self.timestamp.clone(), sample.timestamp.as_millis().into());
        record.insert(self.value.clone(), serde_json::to_value(&sample.value)?);
        Ok(Json::Object(record))
    }

    /// Decode the timestamp and value of a record. Any page info is ignored.
    pub fn decode_sample<V: DeserializeOwned>(&self, record: &Json) -> Result<Sample<V>, Error> {
        let record = record
            .as_object()
            .ok_or(Error::MalformedRecord("not an object"))?;
        let timestamp = record
            .get(&self.timestamp)
            .ok_or(Error::MalformedRecord("missing timestamp"))?
            .as_i64()
            .ok_or(Error::MalformedRecord("timestamp is not an integer"))?;
        let value = record
            .get(&self.value)
            .ok_or(Error::MalformedRecord("missing value"))?;
        Ok(Sample {
            timestamp: Timestamp::from_millis(timestamp),
            value: serde_json::from_value(value.clone())?,
        })
    }

    /// Decode the page info of a record, if it has any.
    pub fn decode_page_info(&self, record: &Json) -> Option<PageInfo> {
        let page = record.get(&self.page_info)?;
        Some(PageInfo {
            id: page.get(ID)?.as_u64()?,
            version: page.get(VERSION)?.as_u64()?,
        })
    }
}
