//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::bridge::MouseButton;
use crate::models::SessionKind;

/// Record desktop sessions by observation and replay them later
#[derive(Parser, Debug)]
#[command(name = "deskreplay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding settings, recordings and screenshots
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a session until the duration elapses, stdin closes or Ctrl-C
    Record {
        #[arg(short, long, value_enum, default_value_t = KindArg::Intelligent)]
        kind: KindArg,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Replay a stored recording
    Replay {
        /// Recording id as shown by `list`
        id: String,

        /// Playback speed multiplier (defaults to the configured speed)
        #[arg(short, long)]
        speed: Option<f64>,
    },

    /// List stored recordings
    List,

    /// Click once at screen coordinates
    #[command(allow_negative_numbers = true)]
    Click {
        x: i32,
        y: i32,

        #[arg(short, long, value_enum, default_value_t = ButtonArg::Left)]
        button: ButtonArg,
    },

    /// Type text into the focused window; newlines press Return
    Type {
        #[arg(allow_hyphen_values = true)]
        text: String,
    },

    /// Press a key or chord, e.g. `Return` or `ctrl+s`
    Key { name: String },

    /// Capture the screen into the screenshots directory
    Screenshot,

    /// Print screen size, pointer position and active window as JSON
    ScreenInfo,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    /// Sample pointer, windows and clipboard automatically
    Intelligent,
    /// Each stdin line is recorded as one step
    Manual,
}

impl From<KindArg> for SessionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Intelligent => SessionKind::Intelligent,
            KindArg::Manual => SessionKind::Manual,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonArg {
    Left,
    Middle,
    Right,
}

impl From<ButtonArg> for MouseButton {
    fn from(button: ButtonArg) -> Self {
        match button {
            ButtonArg::Left => MouseButton::Left,
            ButtonArg::Middle => MouseButton::Middle,
            ButtonArg::Right => MouseButton::Right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_defaults_to_intelligent() {
        let cli = Cli::try_parse_from(["deskreplay", "record"]).unwrap();
        match cli.command {
            Commands::Record { kind, duration } => {
                assert_eq!(kind, KindArg::Intelligent);
                assert_eq!(duration, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "deskreplay",
            "replay",
            "session_1700000000000",
            "--speed",
            "2",
            "--data-dir",
            "/tmp/dr",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/dr")));
        match cli.command {
            Commands::Replay { id, speed } => {
                assert_eq!(id, "session_1700000000000");
                assert_eq!(speed, Some(2.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn manual_kind_maps_to_session_kind() {
        let cli = Cli::try_parse_from(["deskreplay", "record", "--kind", "manual", "-d", "30"]).unwrap();
        match cli.command {
            Commands::Record { kind, duration } => {
                assert_eq!(SessionKind::from(kind), SessionKind::Manual);
                assert_eq!(duration, Some(30));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn click_takes_coordinates_and_button() {
        let cli = Cli::try_parse_from(["deskreplay", "click", "640", "-20", "--button", "right"])
            .unwrap();
        match cli.command {
            Commands::Click { x, y, button } => {
                assert_eq!((x, y), (640, -20));
                assert_eq!(MouseButton::from(button), MouseButton::Right);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["deskreplay", "click", "1", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Click { button: ButtonArg::Left, .. }));
        assert!(Cli::try_parse_from(["deskreplay", "click", "1"]).is_err());
    }

    #[test]
    fn type_and_key_take_one_argument() {
        let cli = Cli::try_parse_from(["deskreplay", "type", "hello world"]).unwrap();
        assert!(matches!(cli.command, Commands::Type { text } if text == "hello world"));

        let cli = Cli::try_parse_from(["deskreplay", "key", "ctrl+s"]).unwrap();
        assert!(matches!(cli.command, Commands::Key { name } if name == "ctrl+s"));
    }

    #[test]
    fn query_commands_take_no_arguments() {
        let cli = Cli::try_parse_from(["deskreplay", "screen-info"]).unwrap();
        assert!(matches!(cli.command, Commands::ScreenInfo));

        let cli = Cli::try_parse_from(["deskreplay", "screenshot"]).unwrap();
        assert!(matches!(cli.command, Commands::Screenshot));
        assert!(Cli::try_parse_from(["deskreplay", "screenshot", "extra"]).is_err());
    }
}
