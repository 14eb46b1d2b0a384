//! Tool-augmented selector (spec §4.5): drives an LLM tool-use loop
//! against the library accessor, scores the returned tracks against the
//! criteria, and returns an ordered, cost-accounted track list.

pub mod llm;
pub mod ordering;
pub mod tools;

use crate::budget::BudgetManager;
use crate::decision_log::DecisionLogger;
use crate::error::{Error, Result};
use crate::library::LibraryAccessor;
use llm::{ChatMessage, LlmClient, LlmTurn, TokenCounter};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tools::{execute, parse_final_answer, tool_schema, ToolCall};
use uuid::Uuid;
use wavelist_common::model::{
    DecisionType, LibraryTrack, MetadataSource, SelectedTrack, TrackSelectionCriteria,
    ValidationStatus,
};
use wavelist_common::Usd;

const MAX_ITERATIONS: usize = 15;
const ITERATION_WARNING_THRESHOLD: f64 = 0.80;
const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const TOOL_CALL_RETRIES: usize = 2;
const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(90);
const STALL_WINDOW: usize = 3;

pub struct SelectorConfig {
    pub overall_timeout: Duration,
    pub exclude_track_ids: HashSet<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            exclude_track_ids: HashSet::new(),
        }
    }
}

pub struct Selector<'a> {
    library: &'a dyn LibraryAccessor,
    llm: &'a dyn LlmClient,
    tokens: &'a dyn TokenCounter,
    budget: &'a BudgetManager,
    log: &'a DecisionLogger,
}

impl<'a> Selector<'a> {
    pub fn new(
        library: &'a dyn LibraryAccessor,
        llm: &'a dyn LlmClient,
        tokens: &'a dyn TokenCounter,
        budget: &'a BudgetManager,
        log: &'a DecisionLogger,
    ) -> Self {
        Self {
            library,
            llm,
            tokens,
            budget,
            log,
        }
    }

    fn system_prompt(daypart_name: &str, criteria: &TrackSelectionCriteria, min_tracks: usize, max_tracks: usize) -> String {
        format!(
            "You are a radio music director programming the \"{daypart_name}\" daypart. \
             Select between {min_tracks} and {max_tracks} tracks. Australian content must be \
             at least {:.0}% of the playlist. Use the provided tools to discover which tracks \
             exist; do not invent track ids. Your final message must be a JSON array of objects \
             `{{track_id, title, artist, reason}}` and nothing else: no prose, no markdown code \
             fences.",
            criteria.australian_minimum * 100.0
        )
    }

    fn user_prompt(criteria: &TrackSelectionCriteria) -> String {
        let bpm_desc: Vec<String> = criteria
            .bpm_ranges
            .iter()
            .map(|r| format!("{}-{}: {}-{} BPM", r.window.start, r.window.end, r.bpm_min, r.bpm_max))
            .collect();
        let genre_desc: Vec<String> = criteria
            .genre_criteria
            .iter()
            .map(|(g, c)| format!("{g}: {:.0}% (+/-{:.0}%)", c.target * 100.0, c.tolerance * 100.0))
            .collect();
        let era_desc: Vec<String> = criteria
            .era_criteria
            .iter()
            .map(|(e, c)| format!("{e} ({}-{}): {:.0}%", c.min_year, c.max_year, c.target * 100.0))
            .collect();
        format!(
            "BPM sub-windows:\n{}\nGenre mix:\n{}\nEra mix:\n{}\nMood includes: {}\nMood excludes: {}\nSpecialty: {}",
            bpm_desc.join("\n"),
            genre_desc.join("\n"),
            era_desc.join("\n"),
            criteria.mood_includes.join(", "),
            criteria.mood_excludes.join(", "),
            criteria.specialty_tag.as_deref().unwrap_or("none"),
        )
    }

    async fn call_tool_with_retry(&self, call: &ToolCall) -> Result<serde_json::Value> {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(TOOL_CALL_TIMEOUT, execute(call, self.library)).await;
            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if attempt < TOOL_CALL_RETRIES => {
                    attempt += 1;
                    tracing::warn!(tool = call.name(), attempt, error = %e, "tool call failed, retrying");
                }
                Ok(Err(e)) => return Err(Error::ToolError(format!("{}: {e}", call.name()))),
                Err(_) if attempt < TOOL_CALL_RETRIES => {
                    attempt += 1;
                    tracing::warn!(tool = call.name(), attempt, "tool call timed out, retrying");
                }
                Err(_) => return Err(Error::ToolTimeout(call.name().to_string())),
            }
        }
    }

    /// Score one candidate track against the criteria. Returns the
    /// number of failed checks and the resulting status.
    fn score_track(
        track: &LibraryTrack,
        criteria: &TrackSelectionCriteria,
        reasoning: &str,
    ) -> (usize, ValidationStatus) {
        let mut failures = 0;

        let bpm_ok = track
            .bpm
            .is_some_and(|bpm| criteria.bpm_ranges.iter().any(|r| r.contains_bpm(bpm)));
        if !bpm_ok {
            failures += 1;
        }

        let genre_ok = track
            .genre
            .as_ref()
            .is_some_and(|g| criteria.genre_criteria.contains_key(g));
        if !genre_ok {
            failures += 1;
        }

        let era_ok = track
            .year
            .is_some_and(|y| criteria.era_criteria.values().any(|c| c.contains_year(y)));
        if !era_ok {
            failures += 1;
        }

        let mood_ok = !criteria
            .mood_excludes
            .iter()
            .any(|excluded| reasoning.to_lowercase().contains(&excluded.to_lowercase()));
        if !mood_ok {
            failures += 1;
        }

        if reasoning.chars().count() < 50 {
            failures += 1;
        }

        let status = match failures {
            0 => ValidationStatus::Pass,
            1 | 2 => ValidationStatus::Warning,
            _ => ValidationStatus::Fail,
        };
        (failures, status)
    }

    /// Run the selector for one daypart, returning ordered selected
    /// tracks and the USD cost incurred.
    pub async fn select(
        &self,
        playlist_id: Uuid,
        daypart_name: &str,
        criteria: &TrackSelectionCriteria,
        min_tracks: usize,
        max_tracks: usize,
        config: SelectorConfig,
    ) -> Result<(Vec<SelectedTrack>, Usd)> {
        let run = async {
            self.select_inner(playlist_id, daypart_name, criteria, min_tracks, max_tracks, &config)
                .await
        };

        match tokio::time::timeout(config.overall_timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                self.log.record(
                    playlist_id,
                    DecisionType::Error,
                    json!({"error_type": "CancellationTimeout", "message": "overall selection timeout elapsed"}),
                    Usd::ZERO,
                    config.overall_timeout.as_millis() as u64,
                )?;
                Err(Error::CancellationTimeout(daypart_name.to_string()))
            }
        }
    }

    async fn select_inner(
        &self,
        playlist_id: Uuid,
        daypart_name: &str,
        criteria: &TrackSelectionCriteria,
        min_tracks: usize,
        max_tracks: usize,
        config: &SelectorConfig,
    ) -> Result<(Vec<SelectedTrack>, Usd)> {
        let mut messages = vec![
            ChatMessage::system(Self::system_prompt(daypart_name, criteria, min_tracks, max_tracks)),
            ChatMessage::user(Self::user_prompt(criteria)),
        ];
        let schema = tool_schema();
        let mut total_cost = Usd::ZERO;
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut stall_count = 0usize;
        let mut malformed_retries = 0usize;

        for iteration in 0..MAX_ITERATIONS {
            if iteration as f64 >= MAX_ITERATIONS as f64 * ITERATION_WARNING_THRESHOLD {
                tracing::warn!(iteration, "selector has consumed 80% of its iteration budget");
            }

            let (input_rate, output_rate) = self.llm.rates();
            let estimated_input_tokens: u64 = messages.iter().map(|m| self.tokens.count(&m.content)).sum();
            let estimate = Usd::from_rate(input_rate, estimated_input_tokens);
            self.budget.reserve(estimate)?;

            let start = std::time::Instant::now();
            let response = self.llm.next_turn(&messages, &schema).await?;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let cost = Usd::from_rate(input_rate, response.usage.input_tokens)
                + Usd::from_rate(output_rate, response.usage.output_tokens);
            total_cost = total_cost + cost;
            self.budget.record(cost, "llm_turn");

            match response.turn {
                LlmTurn::ToolCalls(calls) => {
                    let mut round_new_ids = 0;
                    for call in calls {
                        let parsed = ToolCall::from_name_and_args(&call.name, &call.arguments);
                        let tool_result = match parsed {
                            Ok(tool_call) => match self.call_tool_with_retry(&tool_call).await {
                                Ok(value) => {
                                    if let Some(tracks) = value.as_array() {
                                        for t in tracks {
                                            if let Some(id) = t.get("id").and_then(|v| v.as_str()) {
                                                if seen_ids.insert(id.to_string()) {
                                                    round_new_ids += 1;
                                                }
                                            }
                                        }
                                    }
                                    value
                                }
                                Err(e) => json!({"error": e.to_string()}),
                            },
                            Err(e) => json!({"error": format!("unrecognised tool call: {e}")}),
                        };
                        messages.push(ChatMessage::tool_result(
                            call.id,
                            serde_json::to_string(&tool_result)?,
                        ));
                    }

                    if round_new_ids == 0 {
                        stall_count += 1;
                        if stall_count >= STALL_WINDOW {
                            tracing::info!("last three tool calls returned no new track ids, stopping early");
                            break;
                        }
                    } else {
                        stall_count = 0;
                    }
                }
                LlmTurn::FinalAnswer(text) => {
                    let answers = match parse_final_answer(&text) {
                        Ok(answers) => answers,
                        Err(e) if malformed_retries == 0 => {
                            malformed_retries += 1;
                            tracing::warn!(error = %e, "malformed final answer, requesting corrective retry");
                            messages.push(ChatMessage::user(
                                "That was not valid JSON. Return ONLY the JSON array.",
                            ));
                            continue;
                        }
                        Err(_) => return Err(Error::Llm("two consecutive malformed final answers".into())),
                    };

                    let selected = self
                        .score_and_build(
                            playlist_id,
                            answers,
                            criteria,
                            &config.exclude_track_ids,
                            elapsed_ms,
                            total_cost,
                        )
                        .await?;

                    if selected.len() < min_tracks {
                        return Err(Error::InsufficientTracks {
                            needed: min_tracks,
                            found: selected.len(),
                        });
                    }

                    let ordered = ordering::order_tracks(selected, &criteria.bpm_ranges);
                    let ordered = if ordered.len() > max_tracks {
                        ordered.into_iter().take(max_tracks).collect()
                    } else {
                        ordered
                    };
                    return Ok((ordered, total_cost));
                }
            }
        }

        Err(Error::InsufficientTracks {
            needed: min_tracks,
            found: 0,
        })
    }

    async fn score_and_build(
        &self,
        playlist_id: Uuid,
        answers: Vec<tools::SelectedTrackAnswer>,
        criteria: &TrackSelectionCriteria,
        exclude: &HashSet<String>,
        elapsed_ms: u64,
        total_cost: Usd,
    ) -> Result<Vec<SelectedTrack>> {
        let mut selected = Vec::new();
        // The whole run's accumulated LLM cost is attributed to the first
        // logged entry so `sum(decision_log.cost_incurred)` over this
        // playlist equals the total cost returned to the caller, rather
        // than spreading it thin (or losing it) across every track.
        let mut cost_remaining = total_cost;
        for answer in answers {
            if exclude.contains(&answer.track_id) {
                continue;
            }
            let track = match self.library.track_info(&answer.track_id).await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let (failures, status) = Self::score_track(&track, criteria, &answer.reason);
            if failures >= 3 {
                continue;
            }
            let cost_incurred = cost_remaining;
            cost_remaining = Usd::ZERO;
            self.log.record(
                playlist_id,
                DecisionType::TrackSelection,
                json!({
                    "track_id": track.id,
                    "status": format!("{status:?}"),
                    "failures": failures,
                }),
                cost_incurred,
                elapsed_ms,
            )?;
            selected.push(SelectedTrack {
                track_id: track.id,
                title: track.title,
                artist: track.artist,
                album: track.album,
                duration_seconds: track.duration_seconds,
                is_australian: track.is_australian,
                rotation_category: track.rotation_category,
                position_in_playlist: 0,
                selection_reasoning: answer.reason,
                validation_status: status,
                bpm: track.bpm,
                genre: track.genre,
                year: track.year,
                country: track.country,
                metadata_source: track.metadata_source.or(Some(MetadataSource::Library)),
            });
        }
        Ok(selected)
    }
}
