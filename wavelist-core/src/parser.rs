//! Programming document parser (spec §4.1): markdown station programming
//! documents into the immutable `ProgrammingDocument` model.
//!
//! Both daypart block shapes spec §4.1 requires are supported: (a)
//! heading-delimited (`### Morning`) and (b) bold time-range-delimited
//! (`**06:00 - 10:00**`), since weekend sections in practice use the
//! second shape.

use chrono::NaiveTime;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use wavelist_common::model::{
    BpmRange, DaypartSpecification, ProgrammingDocument, ProgrammingStructure, RotationCategory,
    ScheduleTag, SpecialtyConstraint, TimeWindow,
};
use wavelist_common::{Error, Result};

const GLOBAL_AUSTRALIAN_FALLBACK: f64 = 0.30;

pub fn load(path: &Path) -> Result<ProgrammingDocument> {
    let bytes = std::fs::read(path)?;
    let version = format!("{:x}", Sha256::digest(&bytes));
    let text = String::from_utf8(bytes)
        .map_err(|e| Error::InvalidInput(format!("document is not valid UTF-8: {e}")))?;

    let global_australian = parse_global_australian_minimum(&text);
    let mut structures = Vec::new();
    for (tag, heading) in [
        (ScheduleTag::Weekday, "Monday Programming"),
        (ScheduleTag::Saturday, "Saturday Programming"),
        (ScheduleTag::Sunday, "Sunday Programming"),
    ] {
        if let Some(section) = extract_section(&text, heading) {
            let dayparts = parse_dayparts(&section, global_australian, tag)?;
            if !dayparts.is_empty() {
                structures.push(ProgrammingStructure { tag, dayparts });
            }
        }
    }

    if structures.is_empty() {
        return Err(Error::InvalidInput(
            "document contains no recognised programming structures".into(),
        ));
    }

    let document = ProgrammingDocument {
        document_path: path.to_path_buf(),
        version,
        loaded_at: chrono::Utc::now(),
        lock: None,
        structures,
    };
    document.validate()?;
    Ok(document)
}

fn parse_global_australian_minimum(text: &str) -> f64 {
    let re = Regex::new(r"(?i)Australian\s+Content\*?\*?:\s*(\d+(?:\.\d+)?)%\s*minimum").unwrap();
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|pct| pct / 100.0)
        .unwrap_or(GLOBAL_AUSTRALIAN_FALLBACK)
}

fn extract_section<'a>(text: &'a str, heading: &str) -> Option<&'a str> {
    let start = text.find(heading)?;
    let rest = &text[start..];
    // The section runs until the next top-level heading marker ("# " or
    // "## ") that isn't this one, or the end of the document.
    let after_heading_line = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
    let tail = &rest[after_heading_line..];
    let end = tail
        .match_indices("\n# ")
        .map(|(i, _)| i)
        .chain(tail.match_indices("\n## ").map(|(i, _)| i))
        .min()
        .unwrap_or(tail.len());
    Some(&tail[..end])
}

fn parse_dayparts(
    section: &str,
    global_australian: f64,
    schedule_tag: ScheduleTag,
) -> Result<Vec<DaypartSpecification>> {
    let heading_re = Regex::new(r"(?m)^### +(.+?)\s*$").unwrap();
    let bold_time_re = Regex::new(r"(?m)^\*\*(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2})\*\*").unwrap();

    let mut blocks: Vec<(String, String)> = Vec::new();

    let heading_matches: Vec<_> = heading_re.captures_iter(section).collect();
    if !heading_matches.is_empty() {
        for (i, m) in heading_matches.iter().enumerate() {
            let name = m.get(1).unwrap().as_str().trim().to_string();
            let start = m.get(0).unwrap().end();
            let end = heading_matches
                .get(i + 1)
                .map(|next| next.get(0).unwrap().start())
                .unwrap_or(section.len());
            blocks.push((name, section[start..end].to_string()));
        }
    } else {
        let bold_matches: Vec<_> = bold_time_re.captures_iter(section).collect();
        for (i, m) in bold_matches.iter().enumerate() {
            let start_time = m.get(1).unwrap().as_str();
            let end_time = m.get(2).unwrap().as_str();
            let name = format!("{start_time}-{end_time}");
            let start = m.get(0).unwrap().start();
            let end = bold_matches
                .get(i + 1)
                .map(|next| next.get(0).unwrap().start())
                .unwrap_or(section.len());
            blocks.push((name, section[start..end].to_string()));
        }
    }

    blocks
        .into_iter()
        .map(|(name, body)| parse_one_daypart(&name, &body, global_australian, schedule_tag))
        .collect()
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| Error::InvalidInput(format!("bad time '{s}': {e}")))
}

fn parse_one_daypart(
    name: &str,
    body: &str,
    global_australian: f64,
    schedule_tag: ScheduleTag,
) -> Result<DaypartSpecification> {
    let time_re = Regex::new(r"\*\*Time\*\*:\s*(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2})").unwrap();
    let tph_re = Regex::new(r"\*\*Tracks per Hour\*\*:\s*(\d+)(?:\s*-\s*(\d+))?").unwrap();
    let bpm_line_re =
        Regex::new(r"(?m)^\s*-?\s*(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2}):\s*(\d+)\s*-\s*(\d+)\s*BPM").unwrap();
    let percent_line_re = Regex::new(r"(?m)^\s*-?\s*([\w &/]+?):\s*(\d+(?:\.\d+)?)%").unwrap();
    let australian_re = Regex::new(r"(?i)\*\*Australian Content\*\*:\s*(\d+(?:\.\d+)?)%").unwrap();
    let specialty_re = Regex::new(r"\*\*Specialty\*\*:\s*(.+)").unwrap();

    let (time_start, time_end) = time_re
        .captures(body)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .ok_or_else(|| Error::InvalidInput(format!("daypart '{name}' is missing a Time line")))?;
    let window = TimeWindow::new(parse_time(&time_start)?, parse_time(&time_end)?)?;

    let tracks_per_hour = tph_re
        .captures(body)
        .map(|c| {
            let min: u32 = c[1].parse().unwrap_or(1);
            let max: u32 = c
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(min);
            (min, max)
        })
        .ok_or_else(|| Error::InvalidInput(format!("daypart '{name}' is missing Tracks per Hour")))?;

    let bpm_section = extract_labelled_block(body, "BPM Progression");
    let bpm_progression: Vec<BpmRange> = bpm_line_re
        .captures_iter(&bpm_section)
        .map(|c| {
            let sub_window = TimeWindow::new(parse_time(&c[1])?, parse_time(&c[2])?)?;
            BpmRange::new(sub_window, c[3].parse().unwrap_or(60), c[4].parse().unwrap_or(200))
        })
        .collect::<Result<_>>()?;

    let genre_section = extract_labelled_block(body, "Genre Mix");
    let genre_mix = parse_percent_map(&percent_line_re, &genre_section);

    let era_section = extract_labelled_block(body, "Era Distribution");
    let era_distribution = parse_percent_map(&percent_line_re, &era_section);

    let rotation_section = extract_labelled_block(body, "Rotation Mix");
    let rotation_raw = parse_percent_map(&percent_line_re, &rotation_section);
    let rotation_mix: HashMap<RotationCategory, f64> = rotation_raw
        .into_iter()
        .filter_map(|(k, v)| parse_rotation_category(&k).map(|cat| (cat, v)))
        .collect();

    let mood_includes = extract_list_block(body, "Mood");
    let mood_excludes = extract_list_block(body, "Mood Exclusions");

    let australian_minimum = australian_re
        .captures(body)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|pct| pct / 100.0)
        .unwrap_or(global_australian);

    let specialty = specialty_re.captures(body).map(|c| SpecialtyConstraint {
        tag: c[1].trim().to_string(),
        params: serde_json::Value::Null,
    });

    Ok(DaypartSpecification {
        id: uuid::Uuid::new_v4(),
        name: name.to_string(),
        schedule_tag,
        window,
        target_demographic: String::new(),
        bpm_progression,
        genre_mix,
        era_distribution,
        mood_includes,
        mood_excludes,
        rotation_mix,
        tracks_per_hour,
        australian_minimum,
        specialty,
    })
}

fn extract_labelled_block(body: &str, label: &str) -> String {
    let marker = format!("**{label}**");
    let Some(start) = body.find(&marker) else {
        return String::new();
    };
    let rest = &body[start + marker.len()..];
    let end = rest.find("\n**").unwrap_or(rest.len());
    rest[..end].to_string()
}

fn extract_list_block(body: &str, label: &str) -> Vec<String> {
    let block = extract_labelled_block(body, label);
    block
        .lines()
        .map(|l| l.trim().trim_start_matches('-').trim())
        .filter(|l| !l.is_empty() && !l.starts_with(':'))
        .map(|l| l.trim_start_matches(':').trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn parse_percent_map(re: &Regex, block: &str) -> HashMap<String, f64> {
    re.captures_iter(block)
        .map(|c| (c[1].trim().to_string(), c[2].parse::<f64>().unwrap_or(0.0) / 100.0))
        .collect()
}

fn parse_rotation_category(label: &str) -> Option<RotationCategory> {
    match label.to_ascii_lowercase().as_str() {
        "power" => Some(RotationCategory::Power),
        "medium" => Some(RotationCategory::Medium),
        "light" => Some(RotationCategory::Light),
        "recurrent" => Some(RotationCategory::Recurrent),
        "library" => Some(RotationCategory::Library),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# Station Programming

**Australian Content**: 30% minimum

## Monday Programming

### Morning

**Time**: 06:00 - 10:00
**Tracks per Hour**: 12
**BPM Progression**:
- 06:00-07:00: 90-115 BPM
- 07:00-10:00: 110-135 BPM
**Genre Mix**:
- Alt: 25%
- Electronic: 25%
- Pop: 25%
- Global: 15%
- Jazz: 10%
**Era Distribution**:
- Current: 40%
- Recent: 35%
- Classics: 25%
**Australian Content**: 30%
"#;

    #[test]
    fn parses_happy_path_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekday.md");
        std::fs::write(&path, SAMPLE).unwrap();

        let doc = load(&path).unwrap();
        assert_eq!(doc.structures.len(), 1);
        let daypart = &doc.structures[0].dayparts[0];
        assert_eq!(daypart.name, "Morning");
        assert_eq!(daypart.tracks_per_hour, (12, 12));
        assert_eq!(daypart.bpm_progression.len(), 2);
        assert!((daypart.genre_mix.values().sum::<f64>() - 1.0).abs() < 0.01);
    }

    #[test]
    fn rejects_document_with_no_structures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.md");
        std::fs::write(&path, "# Nothing here\n").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn version_is_stable_for_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekday.md");
        std::fs::write(&path, SAMPLE).unwrap();
        let a = load(&path).unwrap();
        let b = load(&path).unwrap();
        assert_eq!(a.version, b.version);
    }
}
