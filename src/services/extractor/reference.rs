//! Build References
//!
//! Turns what a user pastes (a Jenkins build URL or a `job#number` pair)
//! into a `BuildRef`.

use ci_triage_core::BuildRef;
use url::Url;

use crate::utils::error::{AnalysisError, TriageResult};

/// Parse a build URL or a `job#42` / `job:42` / `job 42` pair.
///
/// Classic (`/job/a/job/b/42/`) and Blue Ocean
/// (`/blue/organizations/jenkins/a%2Fb/detail/main/42/`) URLs are accepted.
/// Folder names are joined with `/`.
pub fn parse_build_reference(raw: &str) -> TriageResult<BuildRef> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AnalysisError::invalid_build_reference("empty build reference"));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return parse_url(raw);
    }
    parse_pair(raw)
}

fn parse_pair(raw: &str) -> TriageResult<BuildRef> {
    let split = raw
        .rsplit_once('#')
        .or_else(|| raw.rsplit_once(':'))
        .or_else(|| raw.rsplit_once(char::is_whitespace));
    let (job, number) = split.ok_or_else(|| {
        AnalysisError::invalid_build_reference(format!(
            "'{}' is neither a build URL nor a job#number pair",
            raw
        ))
    })?;

    let job = job.trim().trim_matches('/');
    if job.is_empty() {
        return Err(AnalysisError::invalid_build_reference(format!(
            "'{}' has no job name",
            raw
        )));
    }
    Ok(BuildRef::new(job, parse_number(number.trim(), raw)?))
}

fn parse_url(raw: &str) -> TriageResult<BuildRef> {
    let url = Url::parse(raw)
        .map_err(|e| AnalysisError::invalid_build_reference(format!("'{}': {}", raw, e)))?;
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| {
            s.filter(|seg| !seg.is_empty())
                .map(|seg| {
                    urlencoding::decode(seg)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| seg.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    let (job, number) = if let Some(pos) = segments.iter().position(|s| s == "blue") {
        blue_ocean(&segments[pos..])
    } else {
        classic(&segments)
    }
    .ok_or_else(|| {
        AnalysisError::invalid_build_reference(format!("'{}' does not name a build", raw))
    })?;

    Ok(BuildRef::new(job, parse_number(&number, raw)?).with_url(raw))
}

/// `/job/<a>/job/<b>/<n>/...`; `view/<name>` segments are skipped.
fn classic(segments: &[String]) -> Option<(String, String)> {
    let mut names = Vec::new();
    let mut number = None;
    let mut i = 0;
    while i < segments.len() {
        match segments[i].as_str() {
            "job" if i + 1 < segments.len() => {
                names.push(segments[i + 1].clone());
                i += 2;
            }
            "view" => i += 2,
            seg if !names.is_empty() && number.is_none() => {
                number = Some(seg.to_string());
                break;
            }
            _ => i += 1,
        }
    }
    if names.is_empty() {
        return None;
    }
    Some((names.join("/"), number?))
}

/// `/blue/organizations/jenkins/<pipeline>/detail/<branch>/<n>/...`
fn blue_ocean(segments: &[String]) -> Option<(String, String)> {
    let pipeline_at = segments.iter().position(|s| s == "jenkins")? + 1;
    let detail_at = segments.iter().position(|s| s == "detail")?;
    let pipeline = segments.get(pipeline_at)?;
    let branch = segments.get(detail_at + 1)?;
    let number = segments.get(detail_at + 2)?;
    let job = if branch == pipeline.rsplit('/').next().unwrap_or(pipeline) {
        pipeline.clone()
    } else {
        format!("{}/{}", pipeline, branch)
    };
    Some((job, number.clone()))
}

fn parse_number(raw: &str, whole: &str) -> TriageResult<u64> {
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AnalysisError::invalid_build_reference(format!(
            "'{}' in '{}' is not a build number",
            raw, whole
        ))),
    }
}
