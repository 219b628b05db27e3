//! Job description parser.
//!
//! ```text
//! SETUP apps/render.zip          # extracted into the job directory
//! EXECUTE
//!   render.exe
//!   --out result --id {JOBID}
//! COLLECT result
//! RESULT results/{JOBID}.zip
//! ```
//!
//! `EXECUTE` consumes the next two lines verbatim as executable and
//! arguments. `{JOBID}` and `{<secret key>}` are substituted
//! case-insensitively before tokenizing.

use anyhow::{Result, bail};

use super::types::{ExecuteItem, JobDescription};
use crate::secrets::types::SwarmSecrets;

pub fn parse_job(src: &str, secrets: &SwarmSecrets) -> Result<JobDescription> {
    let job_id = format!("job-{}", uuid::Uuid::new_v4());

    let mut variables: Vec<(String, &str)> = vec![("{JOBID}".to_string(), job_id.as_str())];
    variables.extend(
        secrets
            .map
            .iter()
            .map(|(k, v)| (format!("{{{}}}", k), v.as_str())),
    );

    let lines: Vec<(String, Vec<String>)> = src
        .lines()
        .map(strip_comment)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let line = replace_variables(line, &variables);
            let tokens = tokenize(&line);
            (line, tokens)
        })
        .collect();

    let mut setup = Vec::new();
    let mut execute = Vec::new();
    let mut collect = Vec::new();
    let mut result: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let (_, tokens) = &lines[i];
        let keyword = tokens.first().map(|t| t.to_ascii_lowercase()).unwrap_or_default();
        match keyword.as_str() {
            "setup" => setup.push(single_argument(tokens, i)?),
            "execute" => {
                let (Some((exe, _)), Some((args, _))) = (lines.get(i + 1), lines.get(i + 2)) else {
                    bail!("line {}: EXECUTE needs an executable line and an arguments line", i + 1);
                };
                execute.push(ExecuteItem {
                    exe: exe.clone(),
                    args: args.clone(),
                });
                i += 2;
            }
            "collect" => collect.push(single_argument(tokens, i)?),
            "result" => {
                if result.is_some() {
                    bail!("line {}: RESULT already defined", i + 1);
                }
                result = Some(single_argument(tokens, i)?);
            }
            other => tracing::debug!(keyword = other, "Ignoring unknown job keyword"),
        }
        i += 1;
    }

    let Some(result) = result else {
        bail!("RESULT is undefined");
    };

    Ok(JobDescription {
        id: job_id,
        setup,
        execute,
        collect,
        result,
    })
}

fn single_argument(tokens: &[String], line: usize) -> Result<String> {
    match tokens {
        [_, arg] => Ok(arg.clone()),
        _ => bail!(
            "line {}: {} expects exactly one argument",
            line + 1,
            tokens.first().map(String::as_str).unwrap_or_default()
        ),
    }
}

fn strip_comment(line: &str) -> String {
    let line = match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    };
    line.trim().to_string()
}

fn replace_variables(line: String, variables: &[(String, &str)]) -> String {
    variables
        .iter()
        .fold(line, |acc, (pattern, value)| replace_ignore_case(&acc, pattern, value))
}

fn replace_ignore_case(haystack: &str, pattern: &str, value: &str) -> String {
    if pattern.is_empty() {
        return haystack.to_string();
    }
    let lower = haystack.to_lowercase();
    let needle = pattern.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; fall back to an exact match.
    if lower.len() != haystack.len() {
        return haystack.replace(pattern, value);
    }

    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    for (start, _) in lower.match_indices(&needle) {
        out.push_str(&haystack[last..start]);
        out.push_str(value);
        last = start + needle.len();
    }
    out.push_str(&haystack[last..]);
    out
}

/// Splits on whitespace; double quotes group and are dropped.
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut inside_quotes = false;

    for c in line.chars() {
        if c == '"' {
            inside_quotes = !inside_quotes;
            continue;
        }
        if c.is_whitespace() && !inside_quotes {
            if !token.is_empty() {
                tokens.push(std::mem::take(&mut token));
            }
            continue;
        }
        token.push(c);
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    tokens
}
