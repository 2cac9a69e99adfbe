//! Message shapes exchanged with clients.
//!
//! Every type here implements [`Mapped`], so its wire form is defined solely
//! by its field table: canonical name, accepted aliases and kind.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::mapper::{self, FieldKind, FieldSpec, FieldValue, Mapped};

/// One batch/lot entry for a drug.
///
/// `created_at` is assigned by the store on insert; any client value is
/// discarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrugRecord {
    /// Drug name; required and never blank once stored.
    pub name: String,
    /// Manufacturer batch or lot number.
    pub lot_number: Option<String>,
    /// Manufacture date as free text, usually `YYYY-MM` or `YYYY-MM-DD`.
    pub manufacture_date: Option<String>,
    pub expiry_date: Option<String>,
    /// Alternative or insurance-list name.
    pub alt_name: Option<String>,
    /// Non-zero when stock is short.
    pub stock_shortage_flag: i32,
    pub note: Option<String>,
    /// Insertion time in UTC, set by the store.
    pub created_at: Option<DateTime<Utc>>,
}

impl DrugRecord {
    /// A record carrying only a name and manufacture date.
    #[must_use]
    pub fn with_manufacture_date(name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manufacture_date: Some(date.into()),
            ..Self::default()
        }
    }
}

static DRUG_RECORD_FIELDS: &[FieldSpec<DrugRecord>] = &[
    FieldSpec {
        name: "name",
        aliases: &["name", "YPMC", "fixmedins_hilist_name"],
        kind: FieldKind::Str,
        get: |r| r.name.clone().into(),
        set: |r, v| r.name = v.into_string().unwrap_or_default(),
    },
    FieldSpec {
        name: "lotNumber",
        aliases: &["manu_lotnum", "lot_number", "batch_no"],
        kind: FieldKind::Str,
        get: |r| r.lot_number.clone().into(),
        set: |r, v| r.lot_number = v.into_string(),
    },
    FieldSpec {
        name: "manufactureDate",
        aliases: &["manu_date", "product_date"],
        kind: FieldKind::Str,
        get: |r| r.manufacture_date.clone().into(),
        set: |r, v| r.manufacture_date = v.into_string(),
    },
    FieldSpec {
        name: "expiryDate",
        aliases: &["expy_end", "expiry_date"],
        kind: FieldKind::Str,
        get: |r| r.expiry_date.clone().into(),
        set: |r, v| r.expiry_date = v.into_string(),
    },
    FieldSpec {
        name: "altName",
        aliases: &["alt_name", "hilist_name"],
        kind: FieldKind::Str,
        get: |r| r.alt_name.clone().into(),
        set: |r, v| r.alt_name = v.into_string(),
    },
    FieldSpec {
        name: "stockShortageFlag",
        aliases: &["kcsb", "stock_shortage"],
        kind: FieldKind::Int32,
        get: |r| r.stock_shortage_flag.into(),
        set: |r, v| r.stock_shortage_flag = v.as_i32().unwrap_or_default(),
    },
    FieldSpec {
        name: "note",
        aliases: &["msg", "remark"],
        kind: FieldKind::Str,
        get: |r| r.note.clone().into(),
        set: |r, v| r.note = v.into_string(),
    },
    FieldSpec {
        name: "createdAt",
        aliases: &["create_time"],
        kind: FieldKind::Timestamp,
        get: |r| r.created_at.into(),
        set: |r, v| r.created_at = v.as_timestamp(),
    },
];

impl Mapped for DrugRecord {
    fn fields() -> &'static [FieldSpec<Self>] { DRUG_RECORD_FIELDS }
}

/// Inbound action envelope.
///
/// `druginfo` is kept as a raw document so each action can map it onto the
/// shape it needs. `name` is the envelope-level fallback for the lookup
/// actions when no `druginfo` is sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionRequest {
    /// Wire tag naming the operation.
    pub action: Option<String>,
    /// Record payload for save and update actions.
    pub druginfo: Option<Value>,
    /// Names for the multi-name date lookup.
    pub names: Option<Vec<String>>,
    /// Client correlation token, echoed verbatim in tagged replies.
    pub request_id: Option<Value>,
    pub name: Option<String>,
}

static ACTION_REQUEST_FIELDS: &[FieldSpec<ActionRequest>] = &[
    FieldSpec {
        name: "action",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.action.clone().into(),
        set: |r, v| r.action = v.into_string(),
    },
    FieldSpec {
        name: "druginfo",
        aliases: &["drugInfo"],
        kind: FieldKind::Document,
        get: |r| r.druginfo.clone().into(),
        set: |r, v| r.druginfo = v.into_document(),
    },
    FieldSpec {
        name: "names",
        aliases: &["names", "drugNames"],
        kind: FieldKind::List(&FieldKind::Str),
        get: |r| {
            r.names.as_ref().map_or(FieldValue::Null, |names| {
                FieldValue::List(names.iter().cloned().map(FieldValue::Str).collect())
            })
        },
        set: |r, v| r.names = v.into_strings(),
    },
    FieldSpec {
        name: "requestId",
        aliases: &[],
        kind: FieldKind::Document,
        get: |r| r.request_id.clone().into(),
        set: |r, v| r.request_id = v.into_document(),
    },
    FieldSpec {
        name: "name",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.name.clone().into(),
        set: |r, v| r.name = v.into_string(),
    },
];

impl Mapped for ActionRequest {
    fn fields() -> &'static [FieldSpec<Self>] { ACTION_REQUEST_FIELDS }
}

/// The standard reply: outcome, status text and optional payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerResponse {
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Action-specific payload, omitted when absent.
    pub data: Option<Value>,
}

impl ServerResponse {
    /// A successful reply with no payload.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    /// A failed reply carrying `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

static SERVER_RESPONSE_FIELDS: &[FieldSpec<ServerResponse>] = &[
    FieldSpec {
        name: "success",
        aliases: &[],
        kind: FieldKind::Bool,
        get: |r| r.success.into(),
        set: |r, v| r.success = v.as_bool().unwrap_or_default(),
    },
    FieldSpec {
        name: "message",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.message.clone().into(),
        set: |r, v| r.message = v.into_string().unwrap_or_default(),
    },
    FieldSpec {
        name: "data",
        aliases: &[],
        kind: FieldKind::Document,
        get: |r| r.data.clone().into(),
        set: |r, v| r.data = v.into_document(),
    },
];

impl Mapped for ServerResponse {
    fn fields() -> &'static [FieldSpec<Self>] { SERVER_RESPONSE_FIELDS }
}

/// A name paired with its last known manufacture date.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrugDate {
    pub name: String,
    /// Last known manufacture date, `None` when nothing is recorded.
    pub manu_date: Option<String>,
}

static DRUG_DATE_FIELDS: &[FieldSpec<DrugDate>] = &[
    FieldSpec {
        name: "name",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.name.clone().into(),
        set: |r, v| r.name = v.into_string().unwrap_or_default(),
    },
    FieldSpec {
        name: "manu_date",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.manu_date.clone().into(),
        set: |r, v| r.manu_date = v.into_string(),
    },
];

impl Mapped for DrugDate {
    fn fields() -> &'static [FieldSpec<Self>] { DRUG_DATE_FIELDS }
}

/// Reply tag for `query_manu_date_by_name`.
pub const MANU_DATE_RESPONSE: &str = "query_manu_date_response";
/// Reply tag for `get_druginfo_productdates`.
pub const PRODUCT_DATES_RESPONSE: &str = "get_druginfo_productdates_response";

/// Tagged reply to `query_manu_date_by_name`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManuDateReply {
    /// Always `query_manu_date_response`.
    pub action: String,
    /// Echo of the request's correlation token.
    pub request_id: Option<Value>,
    pub success: bool,
    /// The looked-up date, present only on success.
    pub data: Option<DrugDate>,
    pub message: String,
}

static MANU_DATE_REPLY_FIELDS: &[FieldSpec<ManuDateReply>] = &[
    FieldSpec {
        name: "action",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.action.clone().into(),
        set: |r, v| r.action = v.into_string().unwrap_or_default(),
    },
    FieldSpec {
        name: "requestId",
        aliases: &[],
        kind: FieldKind::Document,
        get: |r| r.request_id.clone().into(),
        set: |r, v| r.request_id = v.into_document(),
    },
    FieldSpec {
        name: "success",
        aliases: &[],
        kind: FieldKind::Bool,
        get: |r| r.success.into(),
        set: |r, v| r.success = v.as_bool().unwrap_or_default(),
    },
    FieldSpec {
        name: "data",
        aliases: &[],
        kind: FieldKind::Document,
        get: |r| r.data.as_ref().map(mapper::encode).into(),
        set: |r, v| r.data = v.into_document().and_then(|doc| mapper::decode(&doc).ok()),
    },
    FieldSpec {
        name: "message",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.message.clone().into(),
        set: |r, v| r.message = v.into_string().unwrap_or_default(),
    },
];

impl Mapped for ManuDateReply {
    fn fields() -> &'static [FieldSpec<Self>] { MANU_DATE_REPLY_FIELDS }
}

/// Tagged reply to `get_druginfo_productdates`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductDatesReply {
    /// Always `get_druginfo_productdates_response`.
    pub action: String,
    /// Echo of the request's correlation token.
    pub request_id: Option<Value>,
    pub success: bool,
    /// One entry per requested name, in request order.
    pub drug_dates: Vec<DrugDate>,
}

static PRODUCT_DATES_REPLY_FIELDS: &[FieldSpec<ProductDatesReply>] = &[
    FieldSpec {
        name: "action",
        aliases: &[],
        kind: FieldKind::Str,
        get: |r| r.action.clone().into(),
        set: |r, v| r.action = v.into_string().unwrap_or_default(),
    },
    FieldSpec {
        name: "requestId",
        aliases: &[],
        kind: FieldKind::Document,
        get: |r| r.request_id.clone().into(),
        set: |r, v| r.request_id = v.into_document(),
    },
    FieldSpec {
        name: "success",
        aliases: &[],
        kind: FieldKind::Bool,
        get: |r| r.success.into(),
        set: |r, v| r.success = v.as_bool().unwrap_or_default(),
    },
    FieldSpec {
        name: "drugDates",
        aliases: &[],
        kind: FieldKind::List(&FieldKind::Document),
        get: |r| {
            FieldValue::List(
                r.drug_dates
                    .iter()
                    .map(|d| FieldValue::Document(mapper::encode(d)))
                    .collect(),
            )
        },
        set: |r, v| {
            if let FieldValue::List(items) = v {
                r.drug_dates = items
                    .into_iter()
                    .filter_map(FieldValue::into_document)
                    .filter_map(|doc| mapper::decode(&doc).ok())
                    .collect();
            }
        },
    },
];

impl Mapped for ProductDatesReply {
    fn fields() -> &'static [FieldSpec<Self>] { PRODUCT_DATES_REPLY_FIELDS }
}
