use crate::db;
use crate::i18n::{self, Locale};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{current_locale, locale_param, require_db, str_param, LOCALE_SETTING};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_translate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let locale = locale_param(state, req)?;
    let key = str_param(req, "key")?;
    Ok(json!({
        "key": key,
        "locale": locale.code(),
        "text": i18n::translate(locale, key),
    }))
}

fn handle_messages(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let locale = locale_param(state, req)?;
    Ok(json!({ "locale": locale.code(), "messages": i18n::messages(locale) }))
}

fn handle_set_locale(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let raw = str_param(req, "locale")?;
    let locale = Locale::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params("locale must be one of: en, kh").with_details(json!({ "locale": raw }))
    })?;
    db::settings_set_json(conn, LOCALE_SETTING, &json!({ "locale": locale.code() }))
        .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:?}")))?;
    tracing::info!(locale = locale.code(), "ui locale changed");
    Ok(json!({ "locale": locale.code() }))
}

fn handle_get_locale(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    Ok(json!({ "locale": current_locale(conn).code() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "i18n.translate" => handle_translate(state, req),
        "i18n.messages" => handle_messages(state, req),
        "i18n.setLocale" => handle_set_locale(state, req),
        "i18n.getLocale" => handle_get_locale(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
