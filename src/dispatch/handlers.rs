//! One handler per action.
//!
//! Handlers never retry. A store failure is reported once in the reply.
//! Every path that writes a manufacture date updates the lookup cache before
//! touching the store, so the cache always holds the latest date a client
//! reported for a name.

use serde_json::Value;
use tracing::warn;

use super::Dispatcher;
use crate::{
    mapper::{self, MapError},
    protocol::{
        ActionRequest,
        DrugDate,
        DrugRecord,
        MANU_DATE_RESPONSE,
        ManuDateReply,
        PRODUCT_DATES_RESPONSE,
        ProductDatesReply,
        ServerResponse,
    },
    store::StoreError,
};

const EMPTY_NAME: &str = "drug name must not be empty";

fn is_blank(value: Option<&str>) -> bool { value.is_none_or(|v| v.trim().is_empty()) }

/// Map the `druginfo` payload onto a record.
fn druginfo_record(request: &ActionRequest) -> Result<Option<DrugRecord>, MapError> {
    request.druginfo.as_ref().map(mapper::decode).transpose()
}

/// The name a lookup action refers to: `druginfo.name`, else the envelope's.
fn lookup_name(request: &ActionRequest) -> Result<Option<String>, MapError> {
    let from_record = druginfo_record(request)?
        .map(|record| record.name)
        .filter(|name| !name.trim().is_empty());
    Ok(from_record.or_else(|| request.name.clone()))
}

fn invalid_druginfo(e: &MapError) -> ServerResponse {
    ServerResponse::failure(format!("invalid druginfo: {e}"))
}

fn remember_date(ctx: &Dispatcher, record: &DrugRecord) {
    if let Some(date) = record
        .manufacture_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        ctx.cache.put(record.name.clone(), date);
    }
}

/// Last known manufacture date: cache first, then the store.
///
/// A store hit is copied into the cache.
async fn known_manufacture_date(
    ctx: &Dispatcher,
    name: &str,
) -> Result<Option<String>, StoreError> {
    if let Some(date) = ctx.cache.get(name) {
        return Ok(Some(date));
    }
    let date = ctx.store.latest_manufacture_date(name).await?;
    if let Some(date) = &date {
        ctx.cache.put(name, date.clone());
    }
    Ok(date)
}

async fn insert_record(ctx: &Dispatcher, record: DrugRecord, saved: &str) -> ServerResponse {
    remember_date(ctx, &record);
    match ctx.store.insert(record).await {
        Ok(()) => ServerResponse::ok(saved),
        Err(e) => {
            warn!(error = %e, "failed to insert drug record");
            ServerResponse::failure(format!("failed to save drug record: {e}"))
        }
    }
}

pub(super) async fn save_druginfo(ctx: &Dispatcher, request: &ActionRequest) -> ServerResponse {
    let record = match druginfo_record(request) {
        Ok(Some(record)) => record,
        Ok(None) => return ServerResponse::failure("missing druginfo"),
        Err(e) => return invalid_druginfo(&e),
    };
    if is_blank(Some(&record.name)) {
        return ServerResponse::failure(EMPTY_NAME);
    }
    insert_record(ctx, record, "drug record saved").await
}

pub(super) async fn query_druginfo(ctx: &Dispatcher, request: &ActionRequest) -> ServerResponse {
    let name = match lookup_name(request) {
        Ok(Some(name)) if !name.trim().is_empty() => name,
        Ok(_) => return ServerResponse::failure(EMPTY_NAME),
        Err(e) => return invalid_druginfo(&e),
    };
    match ctx.store.find_by_name(&name).await {
        Ok(records) => {
            let count = records.len();
            let data = records.iter().map(mapper::encode).collect();
            ServerResponse::ok(format!("found {count} records")).with_data(Value::Array(data))
        }
        Err(e) => {
            warn!(error = %e, %name, "drug record query failed");
            ServerResponse::failure(format!("query failed: {e}"))
        }
    }
}

pub(super) async fn update_preload(ctx: &Dispatcher, request: &ActionRequest) -> ServerResponse {
    let Some(doc @ Value::Object(_)) = &request.druginfo else {
        return ServerResponse::failure("preload data missing");
    };
    let record: DrugRecord = match mapper::decode(doc) {
        Ok(record) => record,
        Err(e) => return invalid_druginfo(&e),
    };
    let Some(date) = record
        .manufacture_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    else {
        return ServerResponse::failure("manu_date is empty");
    };
    if is_blank(Some(&record.name)) {
        return ServerResponse::failure(EMPTY_NAME);
    }

    ctx.cache.put(record.name.clone(), date);
    match ctx.store.upsert_manufacture_date(&record.name, date).await {
        Ok(()) => ServerResponse::ok("preload stored"),
        Err(e) => {
            warn!(error = %e, name = %record.name, "preload upsert failed");
            ServerResponse::failure(format!("preload failed: {e}"))
        }
    }
}

pub(super) async fn update_batch(
    ctx: &Dispatcher,
    doc: &Value,
    request: &ActionRequest,
) -> ServerResponse {
    let source = request.druginfo.as_ref().unwrap_or(doc);
    let record: DrugRecord = match mapper::decode(source) {
        Ok(record) => record,
        Err(e) => return invalid_druginfo(&e),
    };
    if is_blank(Some(&record.name)) {
        return ServerResponse::failure(EMPTY_NAME);
    }
    insert_record(ctx, record, "batch record saved").await
}

pub(super) async fn update_product_date(
    ctx: &Dispatcher,
    request: &ActionRequest,
) -> ServerResponse {
    let record = match druginfo_record(request) {
        Ok(Some(record)) => record,
        Ok(None) => return ServerResponse::failure("missing druginfo"),
        Err(e) => return invalid_druginfo(&e),
    };
    if is_blank(Some(&record.name)) {
        return ServerResponse::failure(EMPTY_NAME);
    }
    let Some(date) = record
        .manufacture_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    else {
        return ServerResponse::failure("manu_date is empty");
    };

    ctx.cache.put(record.name.clone(), date);
    match ctx.store.upsert_manufacture_date(&record.name, date).await {
        Ok(()) => ServerResponse::ok("manufacture date updated"),
        Err(e) => {
            warn!(error = %e, name = %record.name, "manufacture date upsert failed");
            ServerResponse::failure(format!("failed to update manufacture date: {e}"))
        }
    }
}

pub(super) async fn query_manu_date_by_name(ctx: &Dispatcher, request: ActionRequest) -> Value {
    let name = lookup_name(&request);
    let mut reply = ManuDateReply {
        action: MANU_DATE_RESPONSE.to_owned(),
        request_id: request.request_id,
        ..ManuDateReply::default()
    };

    match name {
        Ok(Some(name)) if !name.trim().is_empty() => {
            match known_manufacture_date(ctx, &name).await {
                Ok(Some(date)) => {
                    reply.success = true;
                    reply.message = "manufacture date found".to_owned();
                    reply.data = Some(DrugDate {
                        name,
                        manu_date: Some(date),
                    });
                }
                Ok(None) => reply.message = format!("no manufacture date recorded for {name}"),
                Err(e) => {
                    warn!(error = %e, %name, "manufacture date lookup failed");
                    reply.message = format!("lookup failed: {e}");
                }
            }
        }
        Ok(_) => reply.message = EMPTY_NAME.to_owned(),
        Err(e) => reply.message = format!("invalid druginfo: {e}"),
    }
    mapper::encode(&reply)
}

pub(super) async fn get_product_dates(ctx: &Dispatcher, request: ActionRequest) -> Value {
    let mut reply = ProductDatesReply {
        action: PRODUCT_DATES_RESPONSE.to_owned(),
        request_id: request.request_id,
        ..ProductDatesReply::default()
    };

    if let Some(names) = request.names {
        reply.success = true;
        for name in names {
            let manu_date = match known_manufacture_date(ctx, &name).await {
                Ok(date) => date,
                Err(e) => {
                    warn!(error = %e, %name, "manufacture date lookup failed");
                    None
                }
            };
            reply.drug_dates.push(DrugDate { name, manu_date });
        }
    }
    mapper::encode(&reply)
}
