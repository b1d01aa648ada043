//! MCP-style tool surface over streamable HTTP: one endpoint, JSON-RPC 2.0
//! messages, session-scoped via the `Mcp-Session-Id` header. `initialize`
//! opens a session, DELETE tears it down, everything else must reference a
//! live session.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use spraywall_types::{
    DEFAULT_COLOR, DEFAULT_FONT, DEFAULT_SIZE, ImageBody, ImageInput, ImageSource, ItemBody,
    NewGraffiti, SnapshotResponse, SprayImageParams, SprayTextParams, WallItemsResponse,
};
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::session::SessionError;

pub const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2025-03-26";

const TOOL_SPRAY_TEXT: &str = "spray_text";
const TOOL_SPRAY_IMAGE: &str = "spray_image";
const TOOL_WALL_ITEMS: &str = "wall_items";
const TOOL_WALL_SNAPSHOT: &str = "wall_snapshot";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SESSION_ERROR: i64 = -32001;

struct WallToolHandler {
    state: AppState,
}

impl WallToolHandler {
    async fn dispatch_tool(
        &self,
        tool_name: &str,
        args: &JsonMap<String, JsonValue>,
    ) -> Result<String, String> {
        match tool_name {
            TOOL_SPRAY_TEXT => self.tool_spray_text(args).await,
            TOOL_SPRAY_IMAGE => self.tool_spray_image(args).await,
            TOOL_WALL_ITEMS => self.tool_wall_items().await,
            TOOL_WALL_SNAPSHOT => self.tool_wall_snapshot().await,
            other => Err(format!("unknown tool: {other}")),
        }
    }

    async fn tool_spray_text(&self, args: &JsonMap<String, JsonValue>) -> Result<String, String> {
        let params: SprayTextParams = serde_json::from_value(JsonValue::Object(args.clone()))
            .map_err(|error| format!("invalid spray_text arguments: {error}"))?;
        let new_item = params.into_new_item().map_err(|error| error.to_string())?;
        let item = self
            .state
            .store
            .append(new_item)
            .await
            .map_err(|error| format!("append failed: {error}"))?;
        to_pretty_json(&json!({ "id": item.id, "created_at": item.created_at }))
    }

    async fn tool_spray_image(&self, args: &JsonMap<String, JsonValue>) -> Result<String, String> {
        let params: SprayImageParams = serde_json::from_value(JsonValue::Object(args.clone()))
            .map_err(|error| format!("invalid spray_image arguments: {error}"))?;
        let validated = params.validated().map_err(|error| error.to_string())?;
        let source = match validated.input {
            ImageInput::Url(url) => ImageSource::Url(url),
            ImageInput::Blob(blob) => {
                let filename = store_blob(&self.state, &blob).await?;
                ImageSource::Asset(filename)
            }
        };
        let item = self
            .state
            .store
            .append(NewGraffiti {
                position: validated.position,
                rotation: validated.rotation,
                opacity: validated.opacity,
                body: ItemBody::Image(ImageBody {
                    dimensions: validated.dimensions,
                    source,
                }),
            })
            .await
            .map_err(|error| format!("append failed: {error}"))?;
        to_pretty_json(&json!({ "id": item.id, "created_at": item.created_at }))
    }

    async fn tool_wall_items(&self) -> Result<String, String> {
        let items = self.state.store.list().await;
        to_pretty_json(&WallItemsResponse {
            item_count: items.len(),
            items,
        })
    }

    async fn tool_wall_snapshot(&self) -> Result<String, String> {
        let items = self.state.store.list().await;
        let snapshot = self
            .state
            .compositor
            .render(items)
            .await
            .map_err(|error| error.to_string())?;
        to_pretty_json(&SnapshotResponse {
            fingerprint: snapshot.fingerprint.clone(),
            width: snapshot.width,
            height: snapshot.height,
            item_count: snapshot.item_count,
            skipped_images: snapshot.skipped_images,
        })
    }
}

/// Decodes an uploaded blob and writes it into the managed asset directory
/// under a generated unique filename, extension inferred from the declared
/// image type.
async fn store_blob(state: &AppState, blob: &str) -> Result<String, String> {
    let (bytes, extension) = decode_blob(blob)?;
    let filename = format!("{}.{extension}", Uuid::new_v4());
    let path = state.compositor.asset_root().join(&filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|error| format!("write asset {}: {error}", path.display()))?;
    Ok(filename)
}

fn decode_blob(blob: &str) -> Result<(Vec<u8>, &'static str), String> {
    let (encoded, extension) = if let Some(rest) = blob.strip_prefix("data:") {
        let (media_type, body) = rest
            .split_once(',')
            .ok_or_else(|| "image_blob data URL has no comma".to_string())?;
        if !media_type.ends_with(";base64") {
            return Err("image_blob data URL must be base64-encoded".to_string());
        }
        let mime = media_type.trim_end_matches(";base64");
        (body, extension_for_mime(mime))
    } else {
        (blob, "png")
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|error| format!("image_blob base64: {error}"))?;
    Ok((bytes, extension))
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        // Undeclared or exotic types get the generic raster extension.
        _ => "png",
    }
}

fn position_schema() -> JsonValue {
    json!({
        "type": "object",
        "description": "Anchor point in percent of canvas size. If both \
            components are below 1 they are treated as fractions and \
            scaled by 100.",
        "properties": {
            "x": { "type": "number", "minimum": 0, "maximum": 100 },
            "y": { "type": "number", "minimum": 0, "maximum": 100 }
        },
        "required": ["x", "y"]
    })
}

fn tool_descriptors() -> JsonValue {
    json!([
        {
            "name": TOOL_SPRAY_TEXT,
            "description": "Spray a styled text tag onto the shared wall.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Tag content; may contain line breaks." },
                    "font": { "type": "string", "default": DEFAULT_FONT },
                    "color": { "type": "string", "default": DEFAULT_COLOR },
                    "position": position_schema(),
                    "size": { "type": "number", "minimum": 8, "maximum": 300, "default": DEFAULT_SIZE },
                    "rotation": { "type": "number", "minimum": -360, "maximum": 360, "default": 0 },
                    "opacity": { "type": "number", "minimum": 0, "maximum": 1, "default": 1 }
                },
                "required": ["text", "position"]
            }
        },
        {
            "name": TOOL_SPRAY_IMAGE,
            "description": "Stick an image onto the shared wall. Provide exactly one of image_url or image_blob.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "image_url": { "type": "string", "description": "Remote http(s) image URL." },
                    "image_blob": { "type": "string", "description": "Base64 payload or data URL; stored in the managed asset directory." },
                    "position": position_schema(),
                    "dimensions": {
                        "type": "object",
                        "description": "Target box in percent of canvas size; aspect ratio is preserved inside it. The fraction heuristic from position applies.",
                        "properties": {
                            "width": { "type": "number", "minimum": 0, "maximum": 100 },
                            "height": { "type": "number", "minimum": 0, "maximum": 100 }
                        },
                        "required": ["width", "height"]
                    },
                    "rotation": { "type": "number", "minimum": -360, "maximum": 360, "default": 0 },
                    "opacity": { "type": "number", "minimum": 0, "maximum": 1, "default": 1 }
                },
                "required": ["position", "dimensions"]
            }
        },
        {
            "name": TOOL_WALL_ITEMS,
            "description": "List every item currently on the wall, in render order.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": TOOL_WALL_SNAPSHOT,
            "description": "Render the current wall state (cached by fingerprint) and return the snapshot metadata.",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ])
}

pub async fn handle_mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message: JsonValue = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(error) => {
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                JsonValue::Null,
                PARSE_ERROR,
                format!("invalid json: {error}"),
            );
        }
    };
    let Some(method) = message.get("method").and_then(JsonValue::as_str) else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            request_id(&message),
            INVALID_REQUEST,
            "message has no method",
        );
    };
    let params = message.get("params").cloned().unwrap_or(JsonValue::Null);

    if method == "initialize" {
        let requested = params
            .get("protocolVersion")
            .and_then(JsonValue::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        let handler = state.registry.create(requested.to_string()).await;
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "spraywall",
                "version": env!("CARGO_PKG_VERSION"),
                "title": "spraywall graffiti wall"
            },
            "instructions": "Spray text tags and image stickers onto the shared wall; \
                positions are percentages of the canvas."
        });
        let body = rpc_result_body(request_id(&message), result);
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE.as_str(), "application/json"),
                (SESSION_HEADER, handler.id()),
            ],
            body,
        )
            .into_response();
    }

    let handler = match session_from_headers(&headers) {
        Ok(session_id) => match state.registry.get(&session_id).await {
            Ok(handler) => handler,
            Err(error) => return session_error_response(error),
        },
        Err(error) => return session_error_response(error),
    };
    handler.touch();

    let Some(id) = request_id_if_present(&message) else {
        // Notifications carry no id and expect no body.
        debug!(session = %handler.id(), %method, "notification accepted");
        return StatusCode::ACCEPTED.into_response();
    };

    match method {
        "ping" => rpc_response(id, json!({})),
        "tools/list" => rpc_response(id, json!({ "tools": tool_descriptors() })),
        "tools/call" => {
            let Some(tool_name) = params.get("name").and_then(JsonValue::as_str) else {
                return rpc_error_response(
                    StatusCode::OK,
                    id,
                    INVALID_PARAMS,
                    "tools/call requires a tool name",
                );
            };
            let args = params
                .get("arguments")
                .and_then(JsonValue::as_object)
                .cloned()
                .unwrap_or_default();
            let tool_handler = WallToolHandler {
                state: state.clone(),
            };
            let result = match tool_handler.dispatch_tool(tool_name, &args).await {
                Ok(text) => json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": false
                }),
                Err(error) => json!({
                    "content": [{ "type": "text", "text": format!("Error: {error}") }],
                    "isError": true
                }),
            };
            rpc_response(id, result)
        }
        other => rpc_error_response(
            StatusCode::OK,
            id,
            METHOD_NOT_FOUND,
            format!("unknown method: {other}"),
        ),
    }
}

/// No server push: consumers poll the HTTP API instead of holding a stream.
pub async fn handle_mcp_get() -> Response {
    rpc_error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        JsonValue::Null,
        INVALID_REQUEST,
        "this server does not offer a message stream; POST messages instead",
    )
}

pub async fn handle_mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session_id = match session_from_headers(&headers) {
        Ok(session_id) => session_id,
        Err(error) => return session_error_response(error),
    };
    match state.registry.remove(&session_id).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(error) => session_error_response(error),
    }
}

fn session_from_headers(headers: &HeaderMap) -> Result<String, SessionError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or(SessionError::MissingSession)
}

fn session_error_response(error: SessionError) -> Response {
    let status = match error {
        SessionError::MissingSession => StatusCode::BAD_REQUEST,
        SessionError::UnknownSession(_) => StatusCode::NOT_FOUND,
    };
    rpc_error_response(status, JsonValue::Null, SESSION_ERROR, error.to_string())
}

fn request_id(message: &JsonValue) -> JsonValue {
    message.get("id").cloned().unwrap_or(JsonValue::Null)
}

fn request_id_if_present(message: &JsonValue) -> Option<JsonValue> {
    match message.get("id") {
        None | Some(JsonValue::Null) => None,
        Some(id) => Some(id.clone()),
    }
}

fn rpc_result_body(id: JsonValue, result: JsonValue) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

fn rpc_response(id: JsonValue, result: JsonValue) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE.as_str(), "application/json")],
        rpc_result_body(id, result),
    )
        .into_response()
}

fn rpc_error_response(
    status: StatusCode,
    id: JsonValue,
    code: i64,
    message: impl Into<String>,
) -> Response {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
    .to_string();
    (
        status,
        [(header::CONTENT_TYPE.as_str(), "application/json")],
        body,
    )
        .into_response()
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|error| format!("encode json response: {error}"))
}
