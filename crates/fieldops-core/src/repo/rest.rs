use std::marker::PhantomData;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::Record;
use crate::patch::Patch;
use crate::repo::Repository;
use crate::time::OperatingZone;

/// Blocking JSON client for the work-order REST API.
///
/// `GET {base}/{resource}` lists, `PATCH {base}/{resource}/{id}` updates and
/// `DELETE {base}/{resource}/{id}` removes. Listed records go through wire
/// ingestion; records without an id are skipped with a warning.
pub struct RestStore<R> {
    agent: ureq::Agent,
    base_url: String,
    zone: OperatingZone,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RestStore<R> {
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration, zone: OperatingZone) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            zone,
            _record: PhantomData,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, R::RESOURCE)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, R::RESOURCE, encode_segment(id))
    }

    fn decode(&self, items: Vec<Value>) -> Vec<R> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let wire = match serde_json::from_value::<R::Wire>(item) {
                Ok(wire) => wire,
                Err(err) => {
                    warn!(resource = R::RESOURCE, error = %err, "skipping undecodable record");
                    continue;
                }
            };
            match R::from_wire(wire, &self.zone) {
                Ok(record) => records.push(record),
                Err(err) => warn!(resource = R::RESOURCE, error = %err, "skipping record"),
            }
        }
        records
    }
}

impl<R: Record> Repository<R> for RestStore<R> {
    fn list(&self) -> Result<Vec<R>, StoreError> {
        let url = self.collection_url();
        debug!(%url, "listing");
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|err| map_error(R::RESOURCE, None, err))?;
        let items: Vec<Value> = response.into_json().map_err(|err| StoreError::Decode {
            resource: R::RESOURCE,
            message: err.to_string(),
        })?;
        Ok(self.decode(items))
    }

    fn patch(&self, id: &str, patch: &Patch) -> Result<(), StoreError> {
        let url = self.record_url(id);
        debug!(%url, fields = patch.len(), "patching");
        self.agent
            .request("PATCH", &url)
            .send_json(patch.to_value())
            .map_err(|err| map_error(R::RESOURCE, Some(id), err))?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let url = self.record_url(id);
        debug!(%url, "deleting");
        self.agent
            .delete(&url)
            .call()
            .map_err(|err| map_error(R::RESOURCE, Some(id), err))?;
        Ok(())
    }
}

fn map_error(resource: &'static str, id: Option<&str>, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_string()
                .unwrap_or_else(|read_err| read_err.to_string());
            status_error(resource, id, status, message)
        }
        ureq::Error::Transport(transport) => StoreError::Unavailable {
            resource,
            id: id.map(str::to_string),
            message: transport.to_string(),
        },
    }
}

fn status_error(
    resource: &'static str,
    id: Option<&str>,
    status: u16,
    message: String,
) -> StoreError {
    match (status, id) {
        (404, Some(id)) => StoreError::NotFound {
            resource,
            id: id.to_string(),
        },
        (500..=599, _) => StoreError::Unavailable {
            resource,
            id: id.map(str::to_string),
            message: format!("HTTP {status}: {message}"),
        },
        _ => StoreError::Rejected {
            resource,
            id: id.map(str::to_string),
            status,
            message,
        },
    }
}

/// Percent-encode an id for use as one URL path segment.
fn encode_segment(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::{Locate, Repair, Stage};
    use serde_json::json;

    fn store<R: Record>() -> RestStore<R> {
        RestStore::new(
            "https://api.example.com/v1/",
            Duration::from_secs(5),
            OperatingZone::us_pacific(),
        )
    }

    #[test]
    fn urls_are_resource_scoped() {
        let locates = store::<Locate>();
        assert_eq!(locates.collection_url(), "https://api.example.com/v1/locates");
        assert_eq!(
            locates.record_url("L 1/2"),
            "https://api.example.com/v1/locates/L%201%2F2"
        );
        assert_eq!(
            store::<Repair>().record_url("R-7"),
            "https://api.example.com/v1/repairs/R-7"
        );
    }

    #[test]
    fn status_codes_map_to_store_errors() {
        let missing = status_error("locates", Some("L-1"), 404, String::new());
        assert_eq!(missing.code(), ErrorCode::RecordNotFound);

        let listing_missing = status_error("locates", None, 404, "no route".to_string());
        assert_eq!(listing_missing.code(), ErrorCode::StoreRejected);

        let down = status_error("repairs", Some("R-1"), 503, "maintenance".to_string());
        assert_eq!(down.code(), ErrorCode::StoreUnavailable);
        assert_eq!(down.id(), Some("R-1"));

        let invalid = status_error("repairs", Some("R-1"), 422, "bad stage".to_string());
        assert!(matches!(invalid, StoreError::Rejected { status: 422, .. }));
    }

    #[test]
    fn decode_skips_records_without_ids() {
        let repairs = store::<Repair>().decode(vec![
            json!({"id": "R-1", "status": "testing"}),
            json!({"work_order_number": "WO-2"}),
            json!("not an object"),
        ]);
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].stage, Stage::Testing);
    }
}
