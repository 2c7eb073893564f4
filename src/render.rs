use crate::{
    controller::{InteractionState, Phase},
    interpreter::{DisplayRecord, Reliability},
    taxonomy::Tone,
};
use ansi_term::{Colour, Style};
use std::fmt::Write;

const BAR_WIDTH: usize = 30;

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { color: true }
    }
}

impl RenderOptions {
    fn paint(&self, style: Style, text: &str) -> String {
        if self.color {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn tone_colour(tone: Tone) -> Colour {
    match tone {
        Tone::Emerald => Colour::Green,
        Tone::Yellow => Colour::Yellow,
        Tone::Orange => Colour::Fixed(208),
        Tone::Red => Colour::Red,
        Tone::DarkRed => Colour::Fixed(88),
    }
}

fn phase_line(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Status: waiting for an image",
        Phase::Ready => "Status: ready, type `submit` to classify",
        Phase::Pending => "Status: analyzing image... running Monte Carlo Dropout inference",
        Phase::Succeeded => "Status: classified",
        Phase::Failed => "Status: classification failed",
    }
}

pub fn render(state: &InteractionState, options: &RenderOptions) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", options.paint(Style::new().bold(), phase_line(state.phase())));

    match state.selected() {
        Some(image) => {
            let _ = write!(out, "Image: {} ({:.0} KB)", image.name, image.size_in_kb());
            if let Some(path) = state.preview().and_then(|p| p.location()) {
                let _ = write!(out, ", preview: {}", path.display());
            }
            out.push('\n');
        }
        None => out.push_str("No image selected. Use `select <path>` or `drop <path>`.\n"),
    }

    if let Some(message) = state.error_message() {
        let _ = writeln!(out, "{}", options.paint(Colour::Red.bold(), &format!("Error: {}", message)));
    }

    if let Some(classification) = state.result() {
        render_record(&mut out, &classification.display, options);
    }

    out
}

pub fn render_record(out: &mut String, record: &DisplayRecord, options: &RenderOptions) {
    let class_style = tone_colour(record.class.tone).bold();
    let _ = writeln!(
        out,
        "Prediction: {}  Confidence: {}",
        options.paint(class_style, record.label),
        record.confidence_text
    );
    if let Some(level) = &record.confidence_level {
        let _ = writeln!(out, "Confidence level: {}", level);
    }
    let _ = writeln!(out, "{}", record.description);

    if let Some(badge) = record.reliability.badge() {
        let colour = match record.reliability {
            Reliability::Reliable => Colour::Green,
            _ => Colour::Yellow,
        };
        let _ = writeln!(out, "{}", options.paint(colour.bold(), badge));
    }

    let _ = writeln!(
        out,
        "Uncertainty (σ): {}  Level: {}",
        record.uncertainty_text, record.uncertainty_level
    );

    out.push_str("Probability distribution:\n");
    for bar in &record.bars {
        let filled = (bar.fill * BAR_WIDTH as f64).round() as usize;
        let _ = writeln!(
            out,
            "  {:<15} {}{} {:>6}",
            bar.label,
            options.paint(Style::new().fg(tone_colour(bar.tone)), &"█".repeat(filled)),
            "░".repeat(BAR_WIDTH - filled),
            bar.percent_text
        );
    }

    if let Some(explanation) = &record.explanation {
        out.push('\n');
        out.push_str(explanation.trim_end());
        out.push('\n');
    }
}
