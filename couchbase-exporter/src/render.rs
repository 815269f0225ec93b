//! Prometheus text exposition format.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use couchbase_exporter_core::Sample;
use couchbase_exporter_core::naming::sanitize_label_name;

/// Render samples in the text exposition format.
///
/// Samples sharing a metric name are grouped under one HELP/TYPE header, in
/// the order their names first appear. `const_labels` are appended to every
/// series unless the metric already carries a label of the same name.
pub fn render(samples: &[Sample], const_labels: &BTreeMap<String, String>) -> String {
    let mut output = Vec::with_capacity(samples.len() * 80);

    let const_labels: Vec<(String, &str)> = const_labels
        .iter()
        .map(|(k, v)| (sanitize_label_name(k), v.as_str()))
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut by_name: HashMap<&str, Vec<&Sample>> = HashMap::new();
    for sample in samples {
        let name = sample.descriptor.name.as_str();
        by_name
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(sample);
    }

    for name in order {
        let series = &by_name[name];
        let descriptor = &series[0].descriptor;

        if !descriptor.description.is_empty() {
            writeln!(output, "# HELP {} {}", name, escape_help(&descriptor.description)).ok();
        }
        writeln!(output, "# TYPE {} {}", name, descriptor.kind.as_str()).ok();

        for sample in series {
            let mut labels: Vec<(&str, &str)> = sample.labels().collect();
            for (k, v) in &const_labels {
                if !labels.iter().any(|(lk, _)| *lk == k.as_str()) {
                    labels.push((k.as_str(), *v));
                }
            }

            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(&labels),
                format_value(sample.value)
            )
            .ok();
        }
    }

    String::from_utf8(output).unwrap_or_default()
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// HELP text escapes backslash and newline only.
fn escape_help(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
