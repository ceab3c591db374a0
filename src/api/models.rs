//! Records returned by the HydroBox backend
//!
//! The backend is loose about its JSON: ids arrive under two different keys, numbers
//! sometimes arrive as strings, endpoints answer with either an object or an array,
//! and field names switch between Spanish and English. Each record therefore parses
//! from a raw `serde_json` object with explicit fallbacks instead of a derived
//! `Deserialize`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) type JsonObject = Map<String, Value>;

/// The logged-in administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUser {
    pub id: i64,
    pub name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub phone_prefix: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl ApiUser {
    /// Parses a login response. The user may sit under `user`, under `data`, or at the root.
    pub fn from_login_json(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        let root: Value = serde_json::from_str(raw).ok()?;
        let root = root.as_object()?;

        let user = if let Some(user) = root.get("user") {
            user.as_object()?
        } else if let Some(data) = root.get("data").and_then(Value::as_object) {
            data
        } else {
            root
        };

        let email = opt_string(user, "email").unwrap_or_default();
        if email.trim().is_empty() {
            return None;
        }

        let raw_name = opt_string(user, "name").unwrap_or_default();
        let mut parts = raw_name.trim().splitn(2, ' ');
        let first_name = parts.next().unwrap_or_default().to_string();
        let last_name = parts.next().map(str::to_string);

        let name = if first_name.trim().is_empty() {
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            first_name
        };

        Some(Self {
            id: opt_i64(user, "id").unwrap_or(0),
            name,
            last_name,
            email,
            phone_prefix: None,
            phone: None,
            avatar_url: non_blank(opt_string(user, "avatar")),
        })
    }

    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.name, last),
            None => self.name.clone(),
        }
    }
}

/// The crop ("hortaliza") currently growing in the box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCrop {
    pub id: i64,
    pub name: String,
}

impl ApiCrop {
    pub(crate) fn from_object(obj: &JsonObject) -> Option<Self> {
        let id = opt_i64(obj, "id_hortaliza")
            .or_else(|| opt_i64(obj, "id"))
            .unwrap_or(0);
        let name = opt_string(obj, "nombre").unwrap_or_default();
        if id == 0 || name.trim().is_empty() {
            return None;
        }
        Some(Self { id, name })
    }
}

/// One row of the measurement log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub ph: Option<f32>,
    /// Oxidation-reduction potential in mV
    pub orp: Option<f32>,
    pub water_temp: Option<f32>,
    pub air_temp: Option<f32>,
    pub humidity: Option<f32>,
    /// Reservoir level in percent
    pub level: Option<f32>,
    pub recorded_at: Option<String>,
}

impl Measurement {
    pub(crate) fn from_object(obj: &JsonObject) -> Self {
        // Older firmware reports conductivity where ORP now lives
        let orp = if obj.contains_key("orp_value") {
            opt_f64(obj, "orp_value")
        } else {
            opt_f64(obj, "ce_value")
        };

        Self {
            ph: opt_f64(obj, "ph_value").map(|v| v as f32),
            orp: orp.map(|v| v as f32),
            water_temp: opt_f64(obj, "tagua_value").map(|v| v as f32),
            air_temp: opt_f64(obj, "tam_value").map(|v| v as f32),
            humidity: opt_f64(obj, "hum_value").map(|v| v as f32),
            level: opt_f64(obj, "us_value").map(|v| v as f32),
            recorded_at: non_blank(opt_string(obj, "fecha")),
        }
    }
}

/// Sensor catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSensor {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub kind: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

impl ApiSensor {
    pub(crate) fn from_object(obj: &JsonObject) -> Self {
        let id = opt_i64(obj, "id")
            .or_else(|| opt_i64(obj, "id_sensor"))
            .unwrap_or(0);
        let name = opt_string(obj, "nombre")
            .or_else(|| opt_string(obj, "name"))
            .unwrap_or_default();

        Self {
            id,
            name: if name.trim().is_empty() {
                format!("Sensor {}", id)
            } else {
                name
            },
            code: non_blank(opt_string(obj, "codigo")),
            kind: non_blank(spanish_or_english(obj, "tipo", "type")),
            unit: non_blank(spanish_or_english(obj, "unidad", "unit")),
            description: non_blank(spanish_or_english(obj, "descripcion", "description")),
        }
    }
}

// The Spanish key wins whenever it is present, even if empty
fn spanish_or_english(obj: &JsonObject, es: &str, en: &str) -> Option<String> {
    if obj.contains_key(es) {
        opt_string(obj, es)
    } else {
        opt_string(obj, en)
    }
}

pub(crate) fn parse_root(raw: &str) -> Result<Option<Value>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw).map(Some)
}

/// An object root, or the first element of an array root when it is an object.
pub(crate) fn first_object(root: Value) -> Option<JsonObject> {
    match root {
        Value::Object(obj) => Some(obj),
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(obj)) => Some(obj),
            _ => None,
        },
        _ => None,
    }
}

/// Every object of an array root, or a lone object root as a one-element list.
pub(crate) fn array_of_objects(root: Value) -> Vec<JsonObject> {
    match root {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(obj),
                _ => None,
            })
            .collect(),
        Value::Object(obj) => vec![obj],
        _ => Vec::new(),
    }
}

fn opt_string(obj: &JsonObject, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn opt_f64(obj: &JsonObject, key: &str) -> Option<f64> {
    let value = match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn opt_i64(obj: &JsonObject, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
