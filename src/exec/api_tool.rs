//! API tools: ordinary tools whose script is generated from an HTTP request
//! description.
//!
//! The generated script merges call-time `body`, `params`, `customHeaders`
//! and `customAuth` arguments over the stored defaults, performs the request
//! through `fetch`, and always returns an envelope instead of throwing.

use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::types::{ApiAuth, HttpMethod, ToolDefinition, ToolType, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS};
use crate::validation::{validate_tool_name, ValidationError};

/// Headers every API tool sends unless overridden
pub fn default_headers() -> Map<String, Value> {
    let mut headers = Map::new();
    headers.insert("Content-Type".into(), json!("application/json"));
    headers.insert("User-Agent".into(), json!("Memvault-APITool"));
    headers
}

/// Argument schema advertised by every API tool
pub fn api_tool_parameters() -> Map<String, Value> {
    let describe = |description: &str| {
        json!({ "type": "object", "description": description, "optional": true })
    };

    let mut parameters = Map::new();
    parameters.insert("body".into(), describe("Request body (POST, PUT, PATCH)"));
    parameters.insert("params".into(), describe("Query parameters"));
    parameters.insert("customHeaders".into(), describe("Headers overriding the defaults"));
    parameters.insert("customAuth".into(), describe("Authentication overriding the default"));
    parameters
}

/// Everything needed to synthesize an API tool
#[derive(Debug, Clone)]
pub struct ApiToolSpec {
    pub name: String,
    pub description: String,
    pub url: String,
    pub method: HttpMethod,
    /// Extra headers, layered over [`default_headers`]
    pub headers: Map<String, Value>,
    pub auth: Option<ApiAuth>,
    pub timeout_ms: u64,
}

impl ApiToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            method: HttpMethod::default(),
            headers: Map::new(),
            auth: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_auth(mut self, auth: ApiAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.clamp(1, MAX_TIMEOUT_MS);
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_tool_name(&self.name)?;
        reqwest::Url::parse(&self.url)
            .map_err(|e| ValidationError::invalid("apiUrl", e.to_string()))?;
        Ok(())
    }

    /// Generated handler script
    pub fn render_script(&self) -> String {
        let mut headers = default_headers();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        let auth = self
            .auth
            .as_ref()
            .and_then(|auth| serde_json::to_value(auth).ok())
            .unwrap_or(Value::Null);

        HANDLER_TEMPLATE
            .replace("__URL__", &rhai_literal(&Value::String(self.url.clone())))
            .replace("__METHOD__", &rhai_literal(&json!(self.method.as_str())))
            .replace("__SENDS_BODY__", if self.method.carries_body() { "true" } else { "false" })
            .replace("__HEADERS__", &rhai_literal(&Value::Object(headers)))
            .replace("__AUTH__", &rhai_literal(&auth))
            .replace("__TIMEOUT__", &self.timeout_ms.to_string())
    }

    /// Validate and turn into a network-capable processor tool
    pub fn into_tool(self) -> Result<ToolDefinition> {
        self.validate()?;
        let script = self.render_script();
        Ok(ToolDefinition::new(
            self.name,
            self.description,
            ToolType::Processor,
            api_tool_parameters(),
            script,
        )
        .with_network_access())
    }
}

const HANDLER_TEMPLATE: &str = r#"// API tool handler
fn present(value) {
    type_of(value) == "string" && value.len() > 0
}

let url = __URL__;
let method = __METHOD__;
let sends_body = __SENDS_BODY__;
let headers = __HEADERS__;
let auth = __AUTH__;

let body = args["body"];
let params = args["params"];
let custom_headers = args["customHeaders"];
let custom_auth = args["customAuth"];

if type_of(custom_headers) == "map" {
    headers.mixin(custom_headers);
}

if type_of(custom_auth) == "map" {
    if type_of(auth) == "map" {
        auth.mixin(custom_auth);
    } else {
        auth = custom_auth;
    }
}

if type_of(auth) == "map" {
    let kind = if present(auth["type"]) { auth["type"] } else { "" };
    if kind == "bearer" && present(auth["token"]) {
        headers["Authorization"] = "Bearer " + auth["token"];
    } else if kind == "basic" && present(auth["username"]) && present(auth["password"]) {
        headers["Authorization"] = "Basic " + base64_encode(auth["username"] + ":" + auth["password"]);
    } else if kind == "api-key" && present(auth["apiKey"]) {
        let header_name = if present(auth["apiKeyHeader"]) { auth["apiKeyHeader"] } else { "X-API-Key" };
        headers[header_name] = auth["apiKey"];
    }
}

let options = #{ method: method, headers: headers, timeout: __TIMEOUT__ };
if type_of(params) == "map" {
    options.query = params;
}
if sends_body && type_of(body) != "()" {
    options.body = body;
}

let started = timestamp();
let outcome = ();
try {
    let response = fetch(url, options);
    let data = if type_of(response.json) != "()" { response.json } else { response.body };
    outcome = #{
        success: response.ok,
        data: data,
        status: response.status,
        statusText: response.statusText,
        headers: response.headers,
        duration: response.duration,
        url: response.url,
        method: method
    };
} catch (err) {
    outcome = #{
        success: false,
        error: `${err}`,
        url: url,
        method: method,
        duration: (started.elapsed * 1000.0).to_int()
    };
}
outcome
"#;

fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Rhai float literals need a decimal point in the mantissa, including
/// before an exponent (`1.0e20`, not `1e20`).
fn float_literal(f: f64) -> String {
    let text = format!("{:?}", f);
    let (mantissa, exponent) = match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (text.as_str(), None),
    };

    let mut literal = mantissa.to_string();
    if !literal.contains('.') {
        literal.push_str(".0");
    }
    if let Some(exponent) = exponent {
        literal.push('e');
        literal.push_str(exponent);
    }
    literal
}

/// Render a JSON value as an equivalent Rhai literal
pub fn rhai_literal(value: &Value) -> String {
    match value {
        Value::Null => "()".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => float_literal(f),
            _ => "()".to_string(),
        },
        Value::String(s) => escape_string(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(rhai_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", escape_string(k), rhai_literal(v)))
                .collect();
            format!("#{{{}}}", fields.join(", "))
        }
    }
}
