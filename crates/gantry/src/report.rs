//! Text rendering of a deployment outcome.

use std::fmt::Write;
use std::time::Duration;

use serde::Serializer;

use crate::api::ApiReport;
use crate::lambda::LambdaReport;
use crate::orchestrator::DeployOutcome;

const API_HEADER: [&str; 6] = ["API", "NAME", "OPERATION", "STAGE", "REMOTE ID", "URL"];
const LAMBDA_HEADER: [&str; 6] = ["LAMBDA", "NAME", "OPERATION", "VERSION", "ALIAS", "ALIAS ARN"];

/// Serialize a duration as whole milliseconds, for `durationMs` fields.
pub(crate) fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Render the API and lambda tables of `outcome`.
pub fn render(outcome: &DeployOutcome) -> String {
    let mut out = String::new();
    if !outcome.lambdas.is_empty() {
        out.push_str(&render_lambdas(&outcome.lambdas));
        out.push('\n');
    }
    out.push_str(&render_apis(&outcome.apis));
    out
}

/// One row per API. The URL column holds the failure when there is one.
pub fn render_apis(reports: &[ApiReport]) -> String {
    let rows: Vec<[String; 6]> = reports
        .iter()
        .map(|r| {
            let url = match (&r.failure, &r.url) {
                (Some(failure), _) => format!("FAILED: {failure}"),
                (None, Some(url)) => url.clone(),
                (None, None) => "not published".to_string(),
            };
            [
                r.identifier.clone(),
                r.remote_name.clone(),
                r.operation.map(|o| o.to_string()).unwrap_or_else(|| "-".into()),
                r.stage.clone().unwrap_or_else(|| "-".into()),
                r.remote_id.clone().unwrap_or_else(|| "-".into()),
                url,
            ]
        })
        .collect();
    table(&API_HEADER, &rows)
}

pub fn render_lambdas(reports: &[LambdaReport]) -> String {
    let rows: Vec<[String; 6]> = reports
        .iter()
        .map(|r| {
            let alias = if r.alias_existed {
                r.alias.clone()
            } else {
                format!("{} (new)", r.alias)
            };
            [
                r.identifier.clone(),
                r.remote_name.clone(),
                r.operation.to_string(),
                r.version.clone(),
                alias,
                r.alias_arn.clone(),
            ]
        })
        .collect();
    table(&LAMBDA_HEADER, &rows)
}

fn table<const N: usize>(header: &[&str; N], rows: &[[String; N]]) -> String {
    let mut widths = header.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header = header.map(str::to_string);
    for row in std::iter::once(&header).chain(rows) {
        let mut line = String::new();
        for (i, (cell, width)) in row.iter().zip(widths).enumerate() {
            if i + 1 == N {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell:<width$}  ");
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
