//! OpenAPI document and Swagger UI page

use axum::response::Html;
use axum::Json;
use serde_json::{json, Value};

const SWAGGER_UI: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>post-snap API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;

fn media_responses() -> Value {
    json!({
        "200": {
            "description": "The rendered post",
            "content": {
                "image/png": { "schema": { "type": "string", "format": "binary" } },
                "video/mp4": { "schema": { "type": "string", "format": "binary" } }
            }
        },
        "400": { "$ref": "#/components/responses/BadRequest" },
        "500": { "$ref": "#/components/responses/JobFailed" }
    })
}

fn id_parameter(description: &str) -> Value {
    json!([{
        "name": "id",
        "in": "path",
        "required": true,
        "description": description,
        "schema": { "type": "string", "pattern": "^[0-9]{1,32}$" }
    }])
}

/// OpenAPI 3.0 description of every route
pub fn openapi_document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "post-snap",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Renders social media posts to images and videos"
        },
        "paths": paths(),
        "components": components()
    })
}

fn paths() -> Value {
    json!({
        "/health": {
            "get": {
                "summary": "Liveness check",
                "responses": {
                    "200": {
                        "description": "Service is up",
                        "content": { "application/json": { "schema": {
                            "type": "object",
                            "properties": {
                                "status": { "type": "string", "example": "ok" },
                                "timestamp": { "type": "string", "format": "date-time" }
                            }
                        } } }
                    }
                }
            }
        },
        "/url": {
            "get": {
                "summary": "Snapshot an arbitrary post URL",
                "parameters": [{
                    "name": "url",
                    "in": "query",
                    "required": true,
                    "schema": { "type": "string", "format": "uri" }
                }],
                "responses": media_responses()
            }
        },
        "/twitter/{id}": {
            "get": {
                "summary": "Snapshot a post on X/Twitter",
                "parameters": id_parameter("Status id"),
                "responses": media_responses()
            }
        },
        "/pixiv/{id}": {
            "get": {
                "summary": "Snapshot a pixiv artwork",
                "parameters": id_parameter("Artwork id"),
                "responses": media_responses()
            }
        },
        "/encoder": {
            "get": {
                "summary": "Probe which ffmpeg encoders work on this host",
                "responses": {
                    "200": {
                        "description": "Family to encoder results",
                        "content": { "application/json": { "schema": {
                            "type": "object",
                            "additionalProperties": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/EncoderCapability" }
                            }
                        } } }
                    }
                }
            }
        },
        "/metrics": {
            "get": {
                "summary": "Job pipeline counters",
                "responses": {
                    "200": {
                        "description": "Current metrics",
                        "content": { "application/json": { "schema": {
                            "$ref": "#/components/schemas/MetricsSnapshot"
                        } } }
                    }
                }
            }
        }
    })
}

fn components() -> Value {
    json!({
        "schemas": {
            "Error": {
                "type": "object",
                "properties": { "error": { "type": "string" } }
            },
            "EncoderCapability": {
                "type": "object",
                "properties": {
                    "codec": { "type": "string" },
                    "format": { "type": "string" },
                    "available": { "type": "boolean" }
                }
            },
            "MetricsSnapshot": {
                "type": "object",
                "properties": {
                    "timestamp_unix_ms": { "type": "integer" },
                    "gate_capacity": { "type": "integer" },
                    "available_slots": { "type": "integer" },
                    "queued_jobs": { "type": "integer" },
                    "running_jobs": { "type": "integer" },
                    "peak_running_jobs": { "type": "integer" },
                    "completed_jobs": { "type": "integer" },
                    "failed_jobs": { "type": "integer" }
                }
            }
        },
        "responses": {
            "BadRequest": {
                "description": "Invalid input",
                "content": {
                    "application/json": { "schema": { "$ref": "#/components/schemas/Error" } }
                }
            },
            "JobFailed": {
                "description": "The snapshot could not be produced",
                "content": {
                    "application/json": { "schema": { "$ref": "#/components/schemas/Error" } }
                }
            }
        }
    })
}

pub async fn openapi_json() -> Json<Value> {
    Json(openapi_document())
}

pub async fn swagger_ui() -> Html<&'static str> {
    Html(SWAGGER_UI)
}
