use crate::convert::{DefaultTypeConverter, TargetType, TypeConverter};
use crate::ognl::{JsonPropertyAccessor, PropertyAccessor};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static DEFAULT_CONVERTER: DefaultTypeConverter = DefaultTypeConverter;
static DEFAULT_ACCESSOR: JsonPropertyAccessor = JsonPropertyAccessor;

/// The in-flight message an expression reads from and writes to.
///
/// Implemented by the surrounding routing runtime. Compiled expressions never
/// keep a reference to an exchange beyond a single evaluation call.
pub trait Exchange {
    fn exchange_id(&self) -> &str;

    fn message_id(&self) -> Option<&str> {
        None
    }

    fn body(&self) -> &Value;

    /// Replace the current body, returning the previous one.
    fn set_body(&mut self, body: Value) -> Value;

    fn header(&self, name: &str) -> Option<&Value>;

    /// All headers as a JSON object.
    fn headers(&self) -> Value;

    fn property(&self, name: &str) -> Option<&Value>;

    fn properties(&self) -> Value;

    fn set_property(&mut self, name: &str, value: Value);

    fn variable(&self, name: &str) -> Option<&Value>;

    fn variables(&self) -> Value;

    fn set_variable(&mut self, name: &str, value: Value);

    /// The exception attached to the exchange, shaped as a JSON object with at
    /// least a `message` field.
    fn exception(&self) -> Option<&Value> {
        None
    }

    fn context_name(&self) -> Option<&str> {
        None
    }

    fn route_id(&self) -> Option<&str> {
        None
    }

    fn step_id(&self) -> Option<&str> {
        None
    }

    fn created(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn message_history(&self, _detailed: bool) -> Option<String> {
        None
    }

    fn system_property(&self, key: &str) -> Option<String> {
        host_system_property(key)
    }

    fn system_environment(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn host_name(&self) -> Option<String> {
        ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .find_map(|k| std::env::var(k).ok())
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
    }

    fn lookup_bean(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Properties-placeholder lookup backing `${properties:key}`.
    fn resolve_placeholder(&self, _key: &str) -> Option<String> {
        None
    }

    /// Class resolution backing the `is` operator and typed functions.
    fn resolve_type(&self, name: &str) -> Option<TargetType> {
        TargetType::from_name(name)
    }

    /// Static constant lookup backing `${type:Name.FIELD}`.
    fn type_constant(&self, _name: &str) -> Option<Value> {
        None
    }

    fn type_converter(&self) -> &dyn TypeConverter {
        &DEFAULT_CONVERTER
    }

    fn property_accessor(&self) -> &dyn PropertyAccessor {
        &DEFAULT_ACCESSOR
    }
}

/// Installs a temporary body and puts the original back when dropped, on
/// every exit path including `?` returns and panics.
pub struct BodyGuard<'a> {
    exchange: &'a mut dyn Exchange,
    original: Option<Value>,
}

impl<'a> BodyGuard<'a> {
    pub fn install(exchange: &'a mut dyn Exchange, body: Value) -> Self {
        let original = exchange.set_body(body);
        Self {
            exchange,
            original: Some(original),
        }
    }

    pub fn set_body(&mut self, body: Value) {
        self.exchange.set_body(body);
    }

    pub fn exchange(&mut self) -> &mut dyn Exchange {
        &mut *self.exchange
    }
}

impl Drop for BodyGuard<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.exchange.set_body(original);
        }
    }
}

fn host_system_property(key: &str) -> Option<String> {
    let env = |names: &[&str]| names.iter().find_map(|n| std::env::var(n).ok());
    match key {
        "user.home" => env(&["HOME", "USERPROFILE"]),
        "user.name" => env(&["USER", "USERNAME"]),
        "user.dir" => std::env::current_dir()
            .ok()
            .map(|p| p.display().to_string()),
        "os.name" => Some(std::env::consts::OS.to_string()),
        "os.arch" => Some(std::env::consts::ARCH.to_string()),
        "java.io.tmpdir" => Some(std::env::temp_dir().display().to_string()),
        "file.separator" => Some(std::path::MAIN_SEPARATOR.to_string()),
        "path.separator" => Some(if cfg!(windows) { ";" } else { ":" }.to_string()),
        "line.separator" => Some(if cfg!(windows) { "\r\n" } else { "\n" }.to_string()),
        _ => None,
    }
}

static EXCHANGE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Self-contained exchange backed by JSON maps.
///
/// Used by the CLI (deserialised from a JSON document) and by tests; real
/// runtimes implement [`Exchange`] on their own message type.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefaultExchange {
    exchange_id: String,
    message_id: Option<String>,
    body: Value,
    headers: Map<String, Value>,
    properties: Map<String, Value>,
    variables: Map<String, Value>,
    exception: Option<Value>,
    context_name: Option<String>,
    route_id: Option<String>,
    step_id: Option<String>,
    created: Option<DateTime<Utc>>,
    beans: Map<String, Value>,
    placeholders: BTreeMap<String, String>,
    system_properties: BTreeMap<String, String>,
    type_constants: Map<String, Value>,
    history: Vec<String>,
}

impl Default for DefaultExchange {
    fn default() -> Self {
        let n = EXCHANGE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            exchange_id: format!("ID-simple-{n:06}"),
            message_id: None,
            body: Value::Null,
            headers: Map::new(),
            properties: Map::new(),
            variables: Map::new(),
            exception: None,
            context_name: Some("simple".to_string()),
            route_id: None,
            step_id: None,
            created: Some(Utc::now()),
            beans: Map::new(),
            placeholders: BTreeMap::new(),
            system_properties: BTreeMap::new(),
            type_constants: Map::new(),
            history: Vec::new(),
        }
    }
}

impl DefaultExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_exchange_id(mut self, id: impl Into<String>) -> Self {
        self.exchange_id = id.into();
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_exception(mut self, message: impl Into<String>) -> Self {
        self.exception = Some(serde_json::json!({ "message": message.into() }));
        self
    }

    pub fn with_route(mut self, route_id: impl Into<String>, step_id: Option<&str>) -> Self {
        let route_id = route_id.into();
        self.history.push(route_id.clone());
        self.route_id = Some(route_id);
        self.step_id = step_id.map(str::to_string);
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_bean(mut self, name: impl Into<String>, bean: Value) -> Self {
        self.beans.insert(name.into(), bean);
        self
    }

    pub fn with_placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_type_constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.type_constants.insert(name.into(), value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }
}

impl Exchange for DefaultExchange {
    fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref().or(Some(self.exchange_id.as_str()))
    }

    fn body(&self) -> &Value {
        &self.body
    }

    fn set_body(&mut self, body: Value) -> Value {
        std::mem::replace(&mut self.body, body)
    }

    fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    fn headers(&self) -> Value {
        Value::Object(self.headers.clone())
    }

    fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    fn properties(&self) -> Value {
        Value::Object(self.properties.clone())
    }

    fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }

    fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn variables(&self) -> Value {
        Value::Object(self.variables.clone())
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    fn context_name(&self) -> Option<&str> {
        self.context_name.as_deref()
    }

    fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    fn step_id(&self) -> Option<&str> {
        self.step_id.as_deref()
    }

    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    fn message_history(&self, detailed: bool) -> Option<String> {
        if self.history.is_empty() {
            return None;
        }
        if detailed {
            let mut out = format!("Message History for exchange {}\n", self.exchange_id);
            for (i, step) in self.history.iter().enumerate() {
                out.push_str(&format!("[{}] {}\n", i + 1, step));
            }
            Some(out)
        } else {
            Some(self.history.join(" -> "))
        }
    }

    fn system_property(&self, key: &str) -> Option<String> {
        self.system_properties
            .get(key)
            .cloned()
            .or_else(|| host_system_property(key))
    }

    fn lookup_bean(&self, name: &str) -> Option<Value> {
        self.beans.get(name).cloned()
    }

    fn resolve_placeholder(&self, key: &str) -> Option<String> {
        self.placeholders.get(key).cloned()
    }

    fn type_constant(&self, name: &str) -> Option<Value> {
        self.type_constants.get(name).cloned()
    }
}
