//! Output rendering.

use colored::{Color, Colorize};
use ldapadm_directory::{Outcome, ResultRecord};

/// Fixed colors used by the pretty renderer.
struct Palette {
    header: Color,
    failure: Color,
    attribute: Color,
    value: Color,
    missing: Color,
}

const PALETTE: Palette = Palette {
    header: Color::White,
    failure: Color::Red,
    attribute: Color::Cyan,
    value: Color::Yellow,
    missing: Color::Magenta,
};

const DIVIDER_WIDTH: usize = 40;
const ATTRIBUTE_WIDTH: usize = 18;

/// Serializes the outcome list as YAML.
pub fn yaml(outcomes: &[Outcome]) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(outcomes)
}

/// Renders a colorized per-target report.
pub fn pretty(outcomes: &[Outcome]) -> String {
    outcomes
        .iter()
        .map(pretty_outcome)
        .collect::<Vec<_>>()
        .join("\n")
}

fn pretty_outcome(outcome: &Outcome) -> String {
    let mut out = format!("{}:\n", outcome.target.color(PALETTE.header));
    if !outcome.success {
        let message = outcome.message.as_deref().unwrap_or("unknown error");
        out.push_str(&format!("{}\n", message.color(PALETTE.failure)));
        return out;
    }
    for record in &outcome.results {
        out.push_str(&pretty_record(record));
    }
    out
}

fn pretty_record(record: &ResultRecord) -> String {
    let divider = format!("{}\n", "-".repeat(DIVIDER_WIDTH));
    let mut entry = String::new();
    for (name, values) in &record.attributes {
        let attribute = format!("{name:<ATTRIBUTE_WIDTH$}").color(PALETTE.attribute);
        match values {
            None => entry.push_str(&format!("{attribute}: {}\n", "None".color(PALETTE.missing))),
            Some(values) => {
                for value in values {
                    entry.push_str(&format!("{attribute}: {}\n", value.color(PALETTE.value)));
                }
            }
        }
    }
    format!("{divider}{entry}{divider}")
}
