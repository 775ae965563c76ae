use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info, warn};

use narrator::{
    narrate::VoiceLibrary,
    notice::{Notice, NoticeLevel},
    util::logging,
    Document, Engine, Session, Settings,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliEngine {
    Offline,
    Cloud,
}

impl From<CliEngine> for Engine {
    fn from(engine: CliEngine) -> Self {
        match engine {
            CliEngine::Offline => Engine::Offline,
            CliEngine::Cloud => Engine::Cloud,
        }
    }
}

/// Narrate a PDF, EPUB, MOBI or plain-text document.
#[derive(Parser, Debug)]
#[command(name = "narrator", version, about)]
struct Cli {
    /// Document to narrate
    #[arg(value_name = "FILE", required_unless_present = "list_voices")]
    file: Option<PathBuf>,

    /// Voice id for the offline engine
    #[arg(short, long)]
    voice: Option<String>,

    /// Language code, e.g. 'en' or 'es'
    #[arg(short, long)]
    language: Option<String>,

    /// Speed multiplier between 0 and 2
    #[arg(short, long, default_value_t = 1.0)]
    speed: f32,

    /// Speech engine
    #[arg(short, long, value_enum, default_value = "offline")]
    engine: CliEngine,

    /// Directory the narration is written to
    #[arg(short, long, env = "NARRATOR_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Convert the narration to MP3 before writing it
    #[arg(long)]
    mp3: bool,

    /// Play the narration on the default output device
    #[arg(short, long)]
    play: bool,

    /// Print the installed voices and exit
    #[arg(long)]
    list_voices: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init("info")?;
    info!(
        "Starting narrator {}, logging to {}",
        env!("CARGO_PKG_VERSION"),
        logging::current_log_file().display()
    );

    let mut settings = Settings::load().context("could not load settings")?;
    if let Some(output) = &cli.output {
        settings.output_dir = output.clone();
    }
    let voices = Arc::new(VoiceLibrary::new(settings.voices_dir.clone()));

    if cli.list_voices {
        for voice in voices.list() {
            println!(
                "{}\t{}\t{}",
                voice.id,
                voice.label,
                voice.language.as_deref().unwrap_or("-")
            );
        }
        return Ok(());
    }

    let Some(path) = &cli.file else {
        return Ok(());
    };
    let document = Document::open(path).with_context(|| format!("could not open {}", path.display()))?;

    let mut session = Session::from_settings(&settings, voices);
    session.set_engine(cli.engine.into());
    session.set_speed(cli.speed);
    if let Some(language) = &cli.language {
        session.set_language(language.clone());
    }
    if cli.voice.is_some() {
        session.set_voice(cli.voice.clone());
    }

    let extracted = session.upload_document(&document).is_some();
    report(&mut session);
    if !extracted {
        anyhow::bail!("no text could be read from {}", path.display());
    }
    if session.narrate().is_none() {
        report(&mut session);
        anyhow::bail!("nothing was narrated from {}", path.display());
    }

    if let Some(exported) = session.export_audio(cli.mp3) {
        println!("{}", exported.display());
    }

    if cli.play {
        session.play();
        while session.playback().is_playing {
            thread::sleep(Duration::from_millis(250));
        }
        session.stop();
    }
    report(&mut session);
    Ok(())
}

fn report(session: &mut Session) {
    for Notice {
        level,
        code,
        message,
        details,
    } in session.take_notices()
    {
        let details = details.map(|d| format!(" ({d})")).unwrap_or_default();
        match level {
            NoticeLevel::Info => info!("[{code}] {message}{details}"),
            NoticeLevel::Warning => warn!("[{code}] {message}{details}"),
            NoticeLevel::Error => error!("[{code}] {message}{details}"),
        }
    }
}
