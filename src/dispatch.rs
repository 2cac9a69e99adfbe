//! Action routing.
//!
//! The dispatcher turns one inbound text message into exactly one reply. The
//! message is parsed, mapped onto an [`ActionRequest`] and routed by its
//! `action` tag to a handler. Message-shape problems and store failures never
//! escape as errors: they become failure replies and the connection carries
//! on.

use std::{fmt, str::FromStr, sync::Arc};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    cache::LookupCache,
    mapper,
    protocol::{
        ActionRequest,
        MANU_DATE_RESPONSE,
        ManuDateReply,
        PRODUCT_DATES_RESPONSE,
        ProductDatesReply,
        ServerResponse,
    },
    store::RecordStore,
};

mod handlers;

/// The closed set of actions a client may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// `save_druginfo`: insert one record.
    SaveDrugInfo,
    /// `query_druginfo`: newest records whose name contains a fragment.
    QueryDrugInfo,
    /// `update_druginfo_preload`: prime the cache without touching the store.
    UpdatePreload,
    /// `update_druginfo_batch`: record a lot number.
    UpdateBatch,
    /// `update_druginfo_productdate`: upsert a manufacture date.
    UpdateProductDate,
    /// `query_manu_date_by_name`: tagged single-name date lookup.
    QueryManuDateByName,
    /// `get_druginfo_productdates`: tagged multi-name date lookup.
    GetProductDates,
}

impl Action {
    /// Wire tag for this action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaveDrugInfo => "save_druginfo",
            Self::QueryDrugInfo => "query_druginfo",
            Self::UpdatePreload => "update_druginfo_preload",
            Self::UpdateBatch => "update_druginfo_batch",
            Self::UpdateProductDate => "update_druginfo_productdate",
            Self::QueryManuDateByName => "query_manu_date_by_name",
            Self::GetProductDates => "get_druginfo_productdates",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// An action tag outside the supported set.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "save_druginfo" => Self::SaveDrugInfo,
            "query_druginfo" => Self::QueryDrugInfo,
            "update_druginfo_preload" => Self::UpdatePreload,
            "update_druginfo_batch" => Self::UpdateBatch,
            "update_druginfo_productdate" => Self::UpdateProductDate,
            "query_manu_date_by_name" => Self::QueryManuDateByName,
            "get_druginfo_productdates" => Self::GetProductDates,
            other => return Err(UnknownAction(other.to_owned())),
        })
    }
}

/// A reply ready for serialisation.
///
/// Most actions answer with the standard envelope; the tag-correlated
/// lookups answer with their own shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The `{success, message, data}` envelope.
    Standard(ServerResponse),
    /// A fully-formed reply document for the tagged lookups.
    Custom(Value),
}

impl Reply {
    /// Render the reply as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Standard(response) => mapper::encode(response),
            Self::Custom(value) => value.clone(),
        }
    }

    /// Whether the reply reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Standard(response) => response.success,
            Self::Custom(value) => value.get("success").and_then(Value::as_bool) == Some(true),
        }
    }
}

impl From<ServerResponse> for Reply {
    fn from(response: ServerResponse) -> Self { Self::Standard(response) }
}

/// Routes requests to handlers over the shared store and cache.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    cache: Arc<LookupCache>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cached_names", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher over a shared store and cache.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<LookupCache>) -> Self {
        Self { store, cache }
    }

    /// The shared lookup cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<LookupCache> { &self.cache }

    /// Handle one text message.
    pub async fn dispatch_text(&self, text: &str) -> Reply {
        match serde_json::from_str::<Value>(text) {
            Ok(doc) => self.dispatch(&doc).await,
            Err(e) => {
                warn!(error = %e, "discarding message that is not JSON");
                ServerResponse::failure(format!("malformed message: {e}")).into()
            }
        }
    }

    /// Handle one parsed message.
    pub async fn dispatch(&self, doc: &Value) -> Reply {
        let request: ActionRequest = match mapper::decode(doc) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "message does not match the action envelope");
                return malformed_envelope(doc, format!("malformed message: {e}"));
            }
        };
        let Some(tag) = request.action.as_deref() else {
            return ServerResponse::failure("malformed message: missing action").into();
        };
        let action = match tag.parse::<Action>() {
            Ok(action) => action,
            Err(unknown) => {
                debug!(action = %unknown.0, "rejecting unknown action");
                return ServerResponse::failure(unknown.to_string()).into();
            }
        };

        debug!(%action, "dispatching");
        match action {
            Action::SaveDrugInfo => handlers::save_druginfo(self, &request).await.into(),
            Action::QueryDrugInfo => handlers::query_druginfo(self, &request).await.into(),
            Action::UpdatePreload => handlers::update_preload(self, &request).await.into(),
            Action::UpdateBatch => handlers::update_batch(self, doc, &request).await.into(),
            Action::UpdateProductDate => {
                handlers::update_product_date(self, &request).await.into()
            }
            Action::QueryManuDateByName => {
                Reply::Custom(handlers::query_manu_date_by_name(self, request).await)
            }
            Action::GetProductDates => {
                Reply::Custom(handlers::get_product_dates(self, request).await)
            }
        }
    }
}

/// Failure reply for a message whose envelope could not be mapped.
///
/// `action` and `requestId` are read straight from the raw document so the
/// tagged lookups still answer in their own shape and echo the request id.
fn malformed_envelope(doc: &Value, message: String) -> Reply {
    let raw = |key| {
        doc.as_object()
            .and_then(|map| mapper::lookup(map, key))
            .filter(|value| !value.is_null())
    };
    let action = raw("action")
        .and_then(Value::as_str)
        .and_then(|tag| tag.parse::<Action>().ok());
    let request_id = raw("requestId").cloned();

    match action {
        Some(Action::QueryManuDateByName) => Reply::Custom(mapper::encode(&ManuDateReply {
            action: MANU_DATE_RESPONSE.to_owned(),
            request_id,
            message,
            ..ManuDateReply::default()
        })),
        Some(Action::GetProductDates) => Reply::Custom(mapper::encode(&ProductDatesReply {
            action: PRODUCT_DATES_RESPONSE.to_owned(),
            request_id,
            ..ProductDatesReply::default()
        })),
        _ => ServerResponse::failure(message).into(),
    }
}
