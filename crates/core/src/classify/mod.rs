//! Application-vs-game classification from sniffer output.
//!
//! A fixed table of weighted signals is matched against imports, strings and
//! code markers. The weights on each side are summed; the margin between the
//! sides decides the category and its magnitude the confidence. Anything
//! below [`LOW_CONFIDENCE_THRESHOLD`] resolves to [`Category::Application`].

use tracing::debug;

use crate::model::{BinaryKind, Category, Classification, ExecutableFingerprint, SubsystemHint};

/// Confidence below which the tie-break default (Application) applies.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.35;

/// Margin at which confidence reaches one half.
const CONFIDENCE_SCALE: f64 = 1.5;

/// Where a signal is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Substring of an imported library or symbol name.
    Import,
    /// Substring of an extracted string, case-insensitive.
    Text,
    /// Exact code-marker name from the sniffer.
    Marker,
}

#[derive(Debug, Clone, Copy)]
struct Signal {
    label: &'static str,
    needle: &'static str,
    source: Source,
    side: Category,
    weight: f64,
}

const fn game(label: &'static str, needle: &'static str, source: Source, weight: f64) -> Signal {
    Signal { label, needle, source, side: Category::Game, weight }
}

const fn app(label: &'static str, needle: &'static str, source: Source, weight: f64) -> Signal {
    Signal { label, needle, source, side: Category::Application, weight }
}

const WINDOWS_SIGNALS: &[Signal] = &[
    game("direct3d", "d3d", Source::Import, 1.5),
    game("directdraw", "ddraw", Source::Import, 1.25),
    game("dxgi", "dxgi", Source::Import, 1.0),
    game("directsound", "dsound", Source::Import, 1.0),
    game("directinput", "dinput", Source::Import, 1.0),
    game("xinput", "xinput", Source::Import, 1.0),
    game("xaudio2", "xaudio2", Source::Import, 1.0),
    game("opengl", "opengl32", Source::Import, 1.0),
    game("vulkan", "vulkan-1", Source::Import, 1.25),
    game("steamworks", "steam_api", Source::Import, 1.5),
    game("bink-video", "binkw", Source::Import, 1.0),
    game("fmod", "fmod", Source::Import, 1.0),
    game("openal", "openal32", Source::Import, 1.0),
    game("unity-player", "unityplayer", Source::Import, 1.5),
    game("multimedia-timer", "winmm", Source::Import, 0.25),
    app("common-controls", "comctl32", Source::Import, 0.5),
    app("common-dialogs", "comdlg32", Source::Import, 0.75),
    app("rich-edit", "riched", Source::Import, 0.75),
    app("rich-edit", "msftedit", Source::Import, 0.75),
    app("mfc", "mfc", Source::Import, 1.0),
    app("ole", "oleaut32", Source::Import, 0.25),
    app("wininet", "wininet", Source::Import, 0.25),
    app("printing", "winspool", Source::Import, 0.5),
];

const DOS_SIGNALS: &[Signal] = &[
    game("vga-mode-13h", "vga-mode-13h", Source::Marker, 1.0),
    game("vga-mode-12h", "vga-mode-12h", Source::Marker, 0.5),
    game("ega-graphics", "ega-mode-0dh", Source::Marker, 0.75),
    game("vesa-graphics", "vesa-set-mode", Source::Marker, 0.5),
    game("vga-framebuffer", "vga-framebuffer", Source::Marker, 0.75),
    game("sound-blaster", "sound-blaster-port", Source::Marker, 1.0),
    game("adlib", "adlib-port", Source::Marker, 0.75),
    game("joystick", "joystick-port", Source::Marker, 0.75),
    game("blaster-env", "blaster", Source::Text, 0.75),
    game("sound-blaster-text", "sound blaster", Source::Text, 0.75),
    game("gravis-ultrasound", "ultrasnd", Source::Text, 0.75),
    game("dos4gw-extender", "dos4gw", Source::Text, 0.5),
];

const TEXT_SIGNALS_WINDOWS: &[Signal] = &[
    game("savegame-text", "savegame", Source::Text, 0.5),
    game("highscore-text", "highscore", Source::Text, 0.5),
];

/// Baseline weights that are not tied to a particular needle.
const CONSOLE_SUBSYSTEM_WEIGHT: f64 = 1.5;
const QUIET_GRAPHICAL_WEIGHT: f64 = 0.5;
const QUIET_DOS_WEIGHT: f64 = 0.5;

/// Classify a fingerprint. Pure: identical input yields identical output.
pub fn classify(fingerprint: &ExecutableFingerprint) -> Classification {
    let mut evidence = Vec::new();
    let mut game_weight = 0.0;
    let mut app_weight = 0.0;

    let table: Vec<&Signal> = match fingerprint.kind {
        BinaryKind::Windows => WINDOWS_SIGNALS.iter().chain(TEXT_SIGNALS_WINDOWS).collect(),
        BinaryKind::Dos => DOS_SIGNALS.iter().collect(),
    };

    let lowered_strings: Vec<String> =
        fingerprint.strings.iter().map(|s| s.to_ascii_lowercase()).collect();
    let mut seen_labels: Vec<&'static str> = Vec::new();

    for signal in table {
        if seen_labels.contains(&signal.label) {
            continue;
        }
        let hit = match signal.source {
            Source::Import => {
                fingerprint.imports.iter().any(|imp| imp.contains(signal.needle))
                    || lowered_strings
                        .iter()
                        .any(|s| s.contains(signal.needle) && s.ends_with(".dll"))
            }
            Source::Text => lowered_strings.iter().any(|s| s.contains(signal.needle)),
            Source::Marker => fingerprint.markers.iter().any(|m| m == signal.needle),
        };
        if !hit {
            continue;
        }
        seen_labels.push(signal.label);
        match signal.side {
            Category::Game => game_weight += signal.weight,
            Category::Application => app_weight += signal.weight,
        }
        evidence.push(format!("{} ({}, +{:.2})", signal.label, signal.side, signal.weight));
    }

    match fingerprint.kind {
        BinaryKind::Windows => match fingerprint.subsystem {
            SubsystemHint::Console => {
                app_weight += CONSOLE_SUBSYSTEM_WEIGHT;
                evidence.push(format!("console subsystem (application, +{CONSOLE_SUBSYSTEM_WEIGHT:.2})"));
            }
            SubsystemHint::Graphical if game_weight == 0.0 => {
                app_weight += QUIET_GRAPHICAL_WEIGHT;
                evidence.push(format!(
                    "graphical subsystem without media imports (application, +{QUIET_GRAPHICAL_WEIGHT:.2})"
                ));
            }
            _ => {}
        },
        BinaryKind::Dos if game_weight == 0.0 => {
            app_weight += QUIET_DOS_WEIGHT;
            evidence.push(format!(
                "no video-mode or sound-device patterns (application, +{QUIET_DOS_WEIGHT:.2})"
            ));
        }
        BinaryKind::Dos => {}
    }

    let classification = decide(game_weight, app_weight, evidence);
    debug!(
        category = classification.category.as_str(),
        confidence = classification.confidence,
        low_confidence = classification.low_confidence,
        "classified executable"
    );
    classification
}

fn decide(game_weight: f64, app_weight: f64, evidence: Vec<String>) -> Classification {
    let margin = game_weight - app_weight;
    let confidence = margin.abs() / (margin.abs() + CONFIDENCE_SCALE);
    let low_confidence = confidence < LOW_CONFIDENCE_THRESHOLD;
    let category = if margin > 0.0 && !low_confidence {
        Category::Game
    } else {
        Category::Application
    };
    Classification { category, confidence, low_confidence, evidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_weights_resolve_to_application() {
        let c = decide(1.0, 1.0, vec![]);
        assert_eq!(c.category, Category::Application);
        assert_eq!(c.confidence, 0.0);
        assert!(c.low_confidence);
    }

    #[test]
    fn weak_game_margin_still_resolves_to_application() {
        let c = decide(0.5, 0.0, vec![]);
        assert!(c.confidence < LOW_CONFIDENCE_THRESHOLD);
        assert_eq!(c.category, Category::Application);
    }

    #[test]
    fn single_strong_game_signal_crosses_threshold() {
        let c = decide(1.0, 0.0, vec![]);
        assert!(c.confidence >= LOW_CONFIDENCE_THRESHOLD);
        assert_eq!(c.category, Category::Game);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        for (g, a) in [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0), (3.25, 1.5)] {
            let c = decide(g, a, vec![]);
            assert!((0.0..=1.0).contains(&c.confidence));
        }
    }
}
