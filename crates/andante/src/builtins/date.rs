//! The `Date` constructor and prototype. All calendar arithmetic is
//! delegated to chrono; the interpreter only stores the millisecond epoch
//! payload (NaN marks an invalid date).

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Timelike, Utc};

use crate::{
    builtins::{arg, called_as_new, define_method, new_ctor},
    error::{Exception, RunResult},
    heap::{ObjId, ObjKind},
    interp::Interpreter,
    value::{Value, number_to_string},
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let (ctor, proto) = new_ctor(interp, "Date", date_ctor)?;
    interp.realm.date = ctor;

    define_method(interp, ctor, "now", date_now)?;
    define_method(interp, ctor, "parse", date_parse)?;
    define_method(interp, ctor, "UTC", date_utc)?;

    define_method(interp, proto, "getTime", |i, t, _| Ok(Value::Number(this_ms(i, &t)?)))?;
    define_method(interp, proto, "valueOf", |i, t, _| Ok(Value::Number(this_ms(i, &t)?)))?;
    define_method(interp, proto, "setTime", proto_set_time)?;
    define_method(interp, proto, "getTimezoneOffset", proto_timezone_offset)?;

    install_getter(interp, proto, "getFullYear", false, 0)?;
    install_getter(interp, proto, "getUTCFullYear", true, 0)?;
    install_getter(interp, proto, "getMonth", false, 1)?;
    install_getter(interp, proto, "getUTCMonth", true, 1)?;
    install_getter(interp, proto, "getDate", false, 2)?;
    install_getter(interp, proto, "getUTCDate", true, 2)?;
    install_getter(interp, proto, "getHours", false, 3)?;
    install_getter(interp, proto, "getUTCHours", true, 3)?;
    install_getter(interp, proto, "getMinutes", false, 4)?;
    install_getter(interp, proto, "getUTCMinutes", true, 4)?;
    install_getter(interp, proto, "getSeconds", false, 5)?;
    install_getter(interp, proto, "getUTCSeconds", true, 5)?;
    install_getter(interp, proto, "getMilliseconds", false, 6)?;
    install_getter(interp, proto, "getUTCMilliseconds", true, 6)?;
    define_method(interp, proto, "getDay", |i, t, _| day_of_week(i, &t, false))?;
    define_method(interp, proto, "getUTCDay", |i, t, _| day_of_week(i, &t, true))?;

    install_setter(interp, proto, "setFullYear", false, 0)?;
    install_setter(interp, proto, "setUTCFullYear", true, 0)?;
    install_setter(interp, proto, "setMonth", false, 1)?;
    install_setter(interp, proto, "setUTCMonth", true, 1)?;
    install_setter(interp, proto, "setDate", false, 2)?;
    install_setter(interp, proto, "setUTCDate", true, 2)?;
    install_setter(interp, proto, "setHours", false, 3)?;
    install_setter(interp, proto, "setUTCHours", true, 3)?;
    install_setter(interp, proto, "setMinutes", false, 4)?;
    install_setter(interp, proto, "setUTCMinutes", true, 4)?;
    install_setter(interp, proto, "setSeconds", false, 5)?;
    install_setter(interp, proto, "setUTCSeconds", true, 5)?;
    install_setter(interp, proto, "setMilliseconds", false, 6)?;
    install_setter(interp, proto, "setUTCMilliseconds", true, 6)?;

    define_method(interp, proto, "toString", |i, t, _| date_string(i, &t))?;
    define_method(interp, proto, "toDateString", |i, t, _| formatted(i, &t, "%a %b %d %Y", false))?;
    define_method(interp, proto, "toTimeString", |i, t, _| formatted(i, &t, "%H:%M:%S GMT%z", false))?;
    define_method(interp, proto, "toLocaleString", |i, t, _| {
        formatted(i, &t, "%m/%d/%Y, %H:%M:%S", false)
    })?;
    define_method(interp, proto, "toLocaleDateString", |i, t, _| formatted(i, &t, "%m/%d/%Y", false))?;
    define_method(interp, proto, "toLocaleTimeString", |i, t, _| formatted(i, &t, "%H:%M:%S", false))?;
    define_method(interp, proto, "toUTCString", |i, t, _| {
        formatted(i, &t, "%a, %d %b %Y %H:%M:%S GMT", true)
    })?;
    define_method(interp, proto, "toISOString", proto_to_iso_string)?;
    define_method(interp, proto, "toJSON", proto_to_iso_string)?;
    Ok(())
}

pub(crate) fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// The date string used by `toString` and by string conversion.
pub(crate) fn to_date_string(ms: f64) -> String {
    match local_datetime(ms) {
        Some(dt) => dt.format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
        None => "Invalid Date".to_owned(),
    }
}

fn local_datetime(ms: f64) -> Option<DateTime<Local>> {
    if !ms.is_finite() {
        return None;
    }
    Local.timestamp_millis_opt(ms as i64).single()
}

fn utc_datetime(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

/// The seven date parts: year, month (0-based), day, hours, minutes,
/// seconds, milliseconds.
fn get_parts(ms: f64, utc: bool) -> Option<[f64; 7]> {
    let (year, month, day, hours, minutes, seconds, millis) = if utc {
        let dt = utc_datetime(ms)?;
        (
            dt.year(),
            dt.month0(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.timestamp_subsec_millis(),
        )
    } else {
        let dt = local_datetime(ms)?;
        (
            dt.year(),
            dt.month0(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.timestamp_subsec_millis(),
        )
    };
    Some([
        f64::from(year),
        f64::from(month),
        f64::from(day),
        f64::from(hours),
        f64::from(minutes),
        f64::from(seconds),
        f64::from(millis),
    ])
}

/// Rebuilds the epoch from parts, normalizing out-of-range fields the way
/// the source dialect does (month 12 rolls into the next year, and so on).
fn ms_from_parts(parts: [f64; 7], utc: bool) -> f64 {
    if parts.iter().any(|part| !part.is_finite()) {
        return f64::NAN;
    }
    let year = parts[0].trunc() as i64;
    let month = parts[1].trunc() as i64;
    let year = year + month.div_euclid(12);
    let month = month.rem_euclid(12);
    let Some(date) = NaiveDate::from_ymd_opt(year as i32, (month + 1) as u32, 1) else {
        return f64::NAN;
    };
    let Some(base) = date.and_hms_opt(0, 0, 0) else {
        return f64::NAN;
    };
    let naive = base
        + Duration::days(parts[2].trunc() as i64 - 1)
        + Duration::hours(parts[3].trunc() as i64)
        + Duration::minutes(parts[4].trunc() as i64)
        + Duration::seconds(parts[5].trunc() as i64)
        + Duration::milliseconds(parts[6].trunc() as i64);
    if utc {
        Utc.from_utc_datetime(&naive).timestamp_millis() as f64
    } else {
        match Local.from_local_datetime(&naive).earliest() {
            Some(dt) => dt.timestamp_millis() as f64,
            None => f64::NAN,
        }
    }
}

fn parse_ms(text: &str) -> f64 {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        return Utc.from_utc_datetime(&naive).timestamp_millis() as f64;
    }
    f64::NAN
}

fn this_ms(interp: &Interpreter, this: &Value) -> Result<f64, Exception> {
    match this.as_object().map(|id| &interp.heap.get(id).kind) {
        Some(ObjKind::Date(ms)) => Ok(*ms),
        _ => Err(Exception::type_error("receiver is not a Date")),
    }
}

fn set_this_ms(interp: &mut Interpreter, this: &Value, ms: f64) -> Result<(), Exception> {
    let id = this
        .as_object()
        .filter(|id| matches!(interp.heap.get(*id).kind, ObjKind::Date(_)))
        .ok_or_else(|| Exception::type_error("receiver is not a Date"))?;
    interp.heap.get_mut(id).kind = ObjKind::Date(ms);
    Ok(())
}

/// The two-digit-year rule of the constructor and `Date.UTC`.
fn adjust_year(year: f64) -> f64 {
    if (0.0..=99.0).contains(&year) && year.fract() == 0.0 {
        1900.0 + year
    } else {
        year
    }
}

fn parts_from_args(interp: &Interpreter, args: &[Value]) -> [f64; 7] {
    let mut parts = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (index, slot) in parts.iter_mut().enumerate() {
        if index < args.len() {
            *slot = args[index].to_number(&interp.heap);
        }
    }
    parts[0] = adjust_year(parts[0]);
    parts
}

fn date_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    if !called_as_new(interp, &this, interp.realm.date) {
        return Ok(Value::string(&to_date_string(now_ms())));
    }
    let ms = match args.len() {
        0 => now_ms(),
        1 => match &args[0] {
            Value::String(text) => parse_ms(text),
            other => other.to_number(&interp.heap),
        },
        _ => ms_from_parts(parts_from_args(interp, args), false),
    };
    let id = this.as_object().expect("constructor receiver");
    interp.heap.get_mut(id).kind = ObjKind::Date(ms);
    Ok(this)
}

fn date_now(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Number(now_ms()))
}

fn date_parse(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string(&interp.heap);
    Ok(Value::Number(parse_ms(&text)))
}

fn date_utc(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Number(ms_from_parts(parts_from_args(interp, args), true)))
}

fn install_getter(
    interp: &mut Interpreter,
    proto: ObjId,
    name: &str,
    utc: bool,
    part: usize,
) -> RunResult<()> {
    define_method(interp, proto, name, move |i, t, _| {
        let ms = this_ms(i, &t)?;
        Ok(Value::Number(
            get_parts(ms, utc).map_or(f64::NAN, |parts| parts[part]),
        ))
    })
}

fn install_setter(
    interp: &mut Interpreter,
    proto: ObjId,
    name: &str,
    utc: bool,
    start: usize,
) -> RunResult<()> {
    define_method(interp, proto, name, move |i, t, args| {
        let ms = this_ms(i, &t)?;
        let mut parts = match get_parts(ms, utc) {
            Some(parts) => parts,
            // Setting a field of an invalid date starts from the epoch.
            None => [1970.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        };
        for (offset, value) in args.iter().enumerate() {
            let index = start + offset;
            if index >= parts.len() {
                break;
            }
            parts[index] = value.to_number(&i.heap);
        }
        let new_ms = ms_from_parts(parts, utc);
        set_this_ms(i, &t, new_ms)?;
        Ok(Value::Number(new_ms))
    })
}

fn day_of_week(interp: &Interpreter, this: &Value, utc: bool) -> Result<Value, Exception> {
    let ms = this_ms(interp, this)?;
    let day = if utc {
        utc_datetime(ms).map(|dt| dt.weekday().num_days_from_sunday())
    } else {
        local_datetime(ms).map(|dt| dt.weekday().num_days_from_sunday())
    };
    Ok(Value::Number(day.map_or(f64::NAN, f64::from)))
}

fn proto_set_time(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let ms = arg(args, 0).to_number(&interp.heap);
    set_this_ms(interp, &this, ms)?;
    Ok(Value::Number(ms))
}

fn proto_timezone_offset(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let ms = this_ms(interp, &this)?;
    let offset = local_datetime(ms).map_or(f64::NAN, |dt| {
        -f64::from(dt.offset().local_minus_utc()) / 60.0
    });
    Ok(Value::Number(offset))
}

fn date_string(interp: &mut Interpreter, this: &Value) -> Result<Value, Exception> {
    let ms = this_ms(interp, this)?;
    Ok(Value::string(&to_date_string(ms)))
}

fn formatted(interp: &mut Interpreter, this: &Value, pattern: &str, utc: bool) -> Result<Value, Exception> {
    let ms = this_ms(interp, this)?;
    let rendered = if utc {
        utc_datetime(ms).map(|dt| dt.format(pattern).to_string())
    } else {
        local_datetime(ms).map(|dt| dt.format(pattern).to_string())
    };
    Ok(Value::string(&rendered.unwrap_or_else(|| "Invalid Date".to_owned())))
}

fn proto_to_iso_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let ms = this_ms(interp, &this)?;
    let Some(dt) = utc_datetime(ms) else {
        return Err(Exception::range_error(format!(
            "Invalid time value {}",
            number_to_string(ms)
        )));
    };
    Ok(Value::string(&dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()))
}
