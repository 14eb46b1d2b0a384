//! The closed set of tools the selector exposes to the LLM (spec §4.5).
//!
//! A closed enum, not string-keyed reflection: every tool the model can
//! call is a variant here, so an unrecognised tool name is a parse error
//! at the boundary rather than a runtime dispatch miss.

use crate::error::{Error, Result};
use crate::library::LibraryAccessor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wavelist_common::model::LibraryTrack;

#[derive(Debug, Clone)]
pub enum ToolCall {
    SearchTracks {
        query: String,
        filters: Option<Value>,
    },
    GetAvailableGenres,
    GetTracksByGenre {
        genre: String,
        limit: usize,
    },
    GetTracksByEra {
        min_year: i32,
        max_year: i32,
    },
    GetTrackInfo {
        track_id: String,
    },
    GetAustralianTracks,
}

impl ToolCall {
    /// Build a `ToolCall` from a requested tool name plus its raw JSON
    /// arguments object, as surfaced by the LLM client. An empty or
    /// absent arguments object is treated as `{}` for no-arg tools.
    pub fn from_name_and_args(name: &str, arguments: &Value) -> Result<ToolCall> {
        let obj = arguments.as_object();
        let get_str = |key: &str| obj.and_then(|o| o.get(key)).and_then(|v| v.as_str());
        let get_i64 = |key: &str| obj.and_then(|o| o.get(key)).and_then(|v| v.as_i64());

        match name {
            "search_tracks" => Ok(ToolCall::SearchTracks {
                query: get_str("query")
                    .ok_or_else(|| Error::ToolError("search_tracks requires 'query'".into()))?
                    .to_string(),
                filters: obj.and_then(|o| o.get("filters")).cloned(),
            }),
            "get_available_genres" => Ok(ToolCall::GetAvailableGenres),
            "get_tracks_by_genre" => Ok(ToolCall::GetTracksByGenre {
                genre: get_str("genre")
                    .ok_or_else(|| Error::ToolError("get_tracks_by_genre requires 'genre'".into()))?
                    .to_string(),
                limit: get_i64("limit").unwrap_or(100).max(1) as usize,
            }),
            "get_tracks_by_era" => Ok(ToolCall::GetTracksByEra {
                min_year: get_i64("min_year")
                    .ok_or_else(|| Error::ToolError("get_tracks_by_era requires 'min_year'".into()))?
                    as i32,
                max_year: get_i64("max_year")
                    .ok_or_else(|| Error::ToolError("get_tracks_by_era requires 'max_year'".into()))?
                    as i32,
            }),
            "get_track_info" => Ok(ToolCall::GetTrackInfo {
                track_id: get_str("track_id")
                    .ok_or_else(|| Error::ToolError("get_track_info requires 'track_id'".into()))?
                    .to_string(),
            }),
            "get_australian_tracks" => Ok(ToolCall::GetAustralianTracks),
            other => Err(Error::ToolError(format!("unrecognised tool: {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SearchTracks { .. } => "search_tracks",
            ToolCall::GetAvailableGenres => "get_available_genres",
            ToolCall::GetTracksByGenre { .. } => "get_tracks_by_genre",
            ToolCall::GetTracksByEra { .. } => "get_tracks_by_era",
            ToolCall::GetTrackInfo { .. } => "get_track_info",
            ToolCall::GetAustralianTracks => "get_australian_tracks",
        }
    }
}

/// JSON schema for the six tools, in the shape an OpenAI-style
/// `tools` request field expects. Sent once per selection conversation.
pub fn tool_schema() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "search_tracks",
                "description": "Keyword/filter search over the library",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "filters": {"type": "object"}
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_available_genres",
                "description": "List library genres with track counts",
                "parameters": {"type": "object", "properties": {}}
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_tracks_by_genre",
                "description": "Genre-scoped track listing, at most 100 results",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "genre": {"type": "string"},
                        "limit": {"type": "integer"}
                    },
                    "required": ["genre"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_tracks_by_era",
                "description": "Era-scoped track listing by inclusive year bounds",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "min_year": {"type": "integer"},
                        "max_year": {"type": "integer"}
                    },
                    "required": ["min_year", "max_year"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_track_info",
                "description": "Full metadata for one track id, including enrichment",
                "parameters": {
                    "type": "object",
                    "properties": {"track_id": {"type": "string"}},
                    "required": ["track_id"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_australian_tracks",
                "description": "Country-filtered listing of Australian tracks",
                "parameters": {"type": "object", "properties": {}}
            }
        }
    ])
}

/// Track ids newly surfaced by a tool result, used by the selector's
/// "last three tool calls returned no new ids" early-stop rule (§4.5).
pub fn new_track_ids(tracks: &[LibraryTrack]) -> Vec<String> {
    tracks.iter().map(|t| t.id.clone()).collect()
}

pub async fn execute(call: &ToolCall, library: &dyn LibraryAccessor) -> Result<Value> {
    let tracks = match call {
        ToolCall::SearchTracks { query, filters } => {
            library.search_tracks(query, filters.as_ref()).await?
        }
        ToolCall::GetAvailableGenres => {
            let genres = library.genres().await?;
            return Ok(serde_json::to_value(
                genres.into_iter().collect::<std::collections::HashMap<_, _>>(),
            )?);
        }
        ToolCall::GetTracksByGenre { genre, limit } => {
            library.tracks_by_genre(genre, (*limit).min(100)).await?
        }
        ToolCall::GetTracksByEra { min_year, max_year } => {
            library.tracks_by_era(*min_year, *max_year).await?
        }
        ToolCall::GetTrackInfo { track_id } => {
            let track = library.track_info(track_id).await?;
            return Ok(serde_json::to_value(track)?);
        }
        ToolCall::GetAustralianTracks => library.australian_tracks().await?,
    };
    Ok(serde_json::to_value(tracks)?)
}

/// The LLM's final answer shape (spec §4.5: "JSON array of objects
/// `{track_id, title, artist, reason}` and nothing else").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTrackAnswer {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub reason: String,
}

/// Parse the model's final message, stripping the code-fence wrapping
/// real models sometimes add despite instructions to the contrary.
pub fn parse_final_answer(raw: &str) -> Result<Vec<SelectedTrackAnswer>> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.strip_suffix("```").unwrap_or(s))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(unfenced).map_err(|e| Error::Llm(format!("malformed final answer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_array() {
        let valid = r#"[{"track_id":"t1","title":"A","artist":"B","reason":"a good fit for the early morning energy curve here"}]"#;
        let parsed = parse_final_answer(valid).unwrap();
        assert_eq!(parsed[0].track_id, "t1");
    }

    #[test]
    fn strips_code_fences() {
        let fenced = "```json\n[]\n```";
        let parsed = parse_final_answer(fenced).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn rejects_trailing_prose() {
        let bad = "[] and that's my answer";
        assert!(parse_final_answer(bad).is_err());
    }
}
