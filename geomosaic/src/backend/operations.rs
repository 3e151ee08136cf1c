//! Named raster operations and their backend endpoints.
//!
//! Operation names follow the `{base}_tif` / `{base}_tif_tiled` convention of
//! the job-execution layer. The same names are executed locally by the
//! pipeline or forwarded to `GET /tif/{base}` when planning is remote.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::BackendError;
use crate::request::RequestError;

/// Which computation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Single-date band export.
    Rgb,
    /// Single-date normalized difference.
    Index,
    /// Date-range composite of bands.
    RgbComposite,
    /// Date-range composite of a normalized difference.
    IndexComposite,
}

impl OperationKind {
    pub fn base_name(&self) -> &'static str {
        match self {
            OperationKind::Rgb => "rgb",
            OperationKind::Index => "index",
            OperationKind::RgbComposite => "rgb_composite",
            OperationKind::IndexComposite => "index_composite",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, OperationKind::RgbComposite | OperationKind::IndexComposite)
    }

    pub fn is_index(&self) -> bool {
        matches!(self, OperationKind::Index | OperationKind::IndexComposite)
    }

    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::Rgb,
            OperationKind::Index,
            OperationKind::RgbComposite,
            OperationKind::IndexComposite,
        ]
    }
}

/// A parsed operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub kind: OperationKind,
    pub tiled: bool,
}

impl Operation {
    /// Remote endpoint path segment under `/tif/`.
    pub fn endpoint(&self) -> String {
        if self.tiled {
            format!("{}_tiled", self.kind.base_name())
        } else {
            self.kind.base_name().to_string()
        }
    }
}

impl FromStr for Operation {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let (base, tiled) = if let Some(base) = name.strip_suffix("_tif_tiled") {
            (base, true)
        } else if let Some(base) = name.strip_suffix("_tif") {
            (base, false)
        } else {
            return Err(unknown_operation(name));
        };

        OperationKind::all()
            .iter()
            .find(|k| k.base_name() == base)
            .map(|&kind| Operation { kind, tiled })
            .ok_or_else(|| unknown_operation(name))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_tif", self.kind.base_name())?;
        if self.tiled {
            f.write_str("_tiled")?;
        }
        Ok(())
    }
}

fn unknown_operation(name: &str) -> RequestError {
    RequestError::InvalidParameter {
        name: "operation",
        reason: format!("unknown operation '{}'", name),
    }
}

/// Endpoint segment for a raw operation name.
pub fn endpoint_for(name: &str) -> Result<String, RequestError> {
    Ok(name.parse::<Operation>()?.endpoint())
}

/// Flattens action parameters into query-string pairs.
///
/// `bbox`, `bands` and `palette` lists become comma strings; a `bbox` list
/// must hold exactly four numbers. `null` values are dropped.
pub fn normalize_params(params: &Map<String, Value>) -> Result<Vec<(String, String)>, RequestError> {
    let mut out = Vec::with_capacity(params.len());

    for (key, value) in params {
        let text = match (key.as_str(), value) {
            (_, Value::Null) => continue,
            ("bbox", Value::Array(items)) => {
                if items.len() != 4 || !items.iter().all(Value::is_number) {
                    return Err(RequestError::InvalidParameter {
                        name: "bbox",
                        reason: format!("expected a list of 4 numbers, got {}", value),
                    });
                }
                join_list(items)
            }
            (_, Value::Array(items)) => join_list(items),
            (_, Value::String(s)) => s.trim().to_string(),
            (_, Value::Bool(b)) => b.to_string(),
            (_, Value::Number(n)) => n.to_string(),
            (_, Value::Object(_)) => {
                return Err(RequestError::InvalidParameter {
                    name: "parameters",
                    reason: format!("'{}' must not be an object", key),
                })
            }
        };
        out.push((key.clone(), text));
    }

    Ok(out)
}

fn join_list(items: &[Value]) -> String {
    items
        .iter()
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Grid metadata returned by a tiled remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTiling {
    pub crs: String,
    pub transform: [f64; 6],
    pub rows: u32,
    pub cols: u32,
}

/// One tile returned by a tiled remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTile {
    pub row: u32,
    pub col: u32,
    pub bbox: [f64; 4],
    pub url: String,
}

/// Response of `GET /tif/{operation}`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResponse {
    Single { url: String },
    Tiled { tiling: RemoteTiling, tiles: Vec<RemoteTile> },
}

#[derive(Deserialize)]
struct RawTile {
    row: u32,
    col: u32,
    #[serde(default)]
    bbox: Option<[f64; 4]>,
    #[serde(default)]
    url: Option<String>,
}

/// Interprets a remote operation's JSON body.
pub fn parse_operation_response(body: &Value) -> Result<OperationResponse, BackendError> {
    if let Some(detail) = body.get("error").and_then(Value::as_str) {
        return Err(BackendError::classify(200, detail));
    }

    if let Some(raw_tiles) = body.get("tiles") {
        let tiling: RemoteTiling = body
            .get("tiling")
            .cloned()
            .ok_or_else(|| BackendError::InvalidResponse("tiled response without 'tiling'".into()))
            .and_then(|t| {
                serde_json::from_value(t).map_err(|e| BackendError::InvalidResponse(e.to_string()))
            })?;

        let raw: Vec<RawTile> = serde_json::from_value(raw_tiles.clone())
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        if raw.is_empty() {
            return Err(BackendError::InvalidResponse("tiled response has no tiles".into()));
        }

        let tiles = raw
            .into_iter()
            .map(|t| match t.url {
                Some(url) if !url.is_empty() => Ok(RemoteTile {
                    row: t.row,
                    col: t.col,
                    bbox: t.bbox.unwrap_or_default(),
                    url,
                }),
                _ => Err(BackendError::InvalidResponse(format!(
                    "tile ({}, {}) has no download URL",
                    t.row, t.col
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        return Ok(OperationResponse::Tiled { tiling, tiles });
    }

    ["tif_url", "url", "result"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(|url| OperationResponse::Single {
            url: url.to_string(),
        })
        .ok_or_else(|| BackendError::InvalidResponse(format!("no download URL in {}", body)))
}
