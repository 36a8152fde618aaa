use anyhow::{Context, Result};
use chatr_core::config::ChatConfig;
use chatr_core::context::{ChatType, MessageContext, MessageId};
use chatr_core::pipeline::FormatPipeline;
use chatr_core::registry::{PermissionSet, PlayerSnapshot, SnapshotRegistry};
use chatr_core::{ChatPipeline, Interception};
use chatr_network::chat::ChatKind;
use chatr_network::{StreamSink, read_frame};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file, created with defaults if it does not exist
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a chat message the way one player would see it
    Preview {
        #[arg(long, default_value = "Steve")]
        sender: String,
        #[arg(long, default_value = "Alex")]
        recipient: String,
        /// Let the sender use color codes
        #[arg(long)]
        color: bool,
        /// More players to count as online
        #[arg(long)]
        online: Vec<String>,
        message: String,
    },
    /// Render the chat packets of a captured clientbound packet stream
    Replay {
        #[arg(long, default_value_t = 763)]
        protocol: i32,
        #[arg(long, default_value = "Alex")]
        recipient: String,
        /// Compression threshold, if the stream is compressed
        #[arg(long)]
        compression: Option<usize>,
        /// Players the captured messages may come from
        #[arg(long)]
        online: Vec<String>,
        input: PathBuf,
        output: PathBuf,
    },
}

fn registry_of(names: impl IntoIterator<Item = String>) -> SnapshotRegistry {
    let registry = SnapshotRegistry::new();
    for name in names {
        registry.publish(PlayerSnapshot::offline(name));
    }
    registry
}

fn preview(
    config: &ChatConfig,
    sender: String,
    recipient: String,
    color: bool,
    online: Vec<String>,
    message: String,
) -> Result<()> {
    let registry = registry_of(online.into_iter().chain([recipient.clone()]));
    let mut permissions = PermissionSet::new();
    if color {
        permissions.insert(&config.color_permission, true);
    }
    let sender = PlayerSnapshot::offline(sender).with_permissions(permissions);
    let sender_id = sender.uuid;
    let body = if sender.has_permission(&config.color_permission) {
        chatr_text::RichText::markup(message)
    } else {
        chatr_text::RichText::literal(message)
    };
    registry.publish(sender);

    let format = FormatPipeline::from_config(config, Arc::new(registry))?;
    let chat_type = ChatType {
        kind: ChatKind::Player,
        registry_id: Some(0),
    };
    let context = MessageContext::new(MessageId(0), chat_type, Some(sender_id), body);
    match format.render(&context, PlayerSnapshot::offline(recipient).uuid) {
        Some(view) => {
            println!("{}", view.plain);
            println!("{}", view.text.encode_json()?);
            info!("Rendered with {:?}", view.format_flags);
        }
        None => println!("(message dropped for this recipient)"),
    }
    Ok(())
}

fn replay(
    config: &ChatConfig,
    protocol: i32,
    recipient: String,
    compression: Option<usize>,
    online: Vec<String>,
    input: PathBuf,
    output: PathBuf,
) -> Result<()> {
    let recipient_id = PlayerSnapshot::offline(recipient.clone()).uuid;
    let registry = Arc::new(registry_of(online.into_iter().chain([recipient])));
    let pipeline = ChatPipeline::new(config, registry)?;

    let mut reader = BufReader::new(
        File::open(&input).with_context(|| format!("could not open {}", input.display()))?,
    );
    let writer = BufWriter::new(
        File::create(&output).with_context(|| format!("could not create {}", output.display()))?,
    );
    let stream = Arc::new(Mutex::new(writer));
    pipeline.open_connection(
        0,
        recipient_id,
        protocol,
        Box::new(StreamSink::new(stream.clone(), compression)),
    );

    let mut packets = 0;
    let mut captured = 0;
    while let Some(packet) = read_frame(&mut reader, compression.is_some())
        .with_context(|| format!("malformed frame after {} packets", packets))?
    {
        packets += 1;
        match pipeline.intercept(0, packet) {
            Interception::PassThrough(packet) => {
                let mut stream = stream
                    .lock()
                    .map_err(|_| anyhow::anyhow!("output stream lock is poisoned"))?;
                match compression {
                    Some(threshold) => packet.write_compressed(&mut *stream, threshold)?,
                    None => packet.write_uncompressed(&mut *stream)?,
                }
            }
            Interception::Captured => captured += 1,
        }
    }

    pipeline.wait_idle(Duration::from_secs(10));
    let stats = pipeline.cache_stats();
    pipeline.shutdown(Duration::from_secs(1));
    stream
        .lock()
        .map_err(|_| anyhow::anyhow!("output stream lock is poisoned"))?
        .flush()?;
    info!(
        "Replayed {} packets, {} held back for rendering, {} renders",
        packets, captured, stats.computations
    );
    Ok(())
}

fn main() -> Result<()> {
    // Setup logging
    let logfile = tracing_appender::rolling::daily("./logs", "chatr.log");
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("CHATR_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_writer(logfile.and(std::io::stdout))
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();
    let config = ChatConfig::load(&cli.config)
        .with_context(|| format!("could not load {}", cli.config.display()))?;

    match cli.command {
        Command::Preview {
            sender,
            recipient,
            color,
            online,
            message,
        } => preview(&config, sender, recipient, color, online, message),
        Command::Replay {
            protocol,
            recipient,
            compression,
            online,
            input,
            output,
        } => replay(&config, protocol, recipient, compression, online, input, output),
    }
}
