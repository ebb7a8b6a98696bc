use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::{panic, process};

use vidflow::config::{DecoderOptions, app_name, version};
use vidflow::decoder::{decoder_list, default_drivers};
use vidflow::demux::packet_channel;
use vidflow::pipeline::types::Timestamp;
use vidflow::pipeline::{DecodeStage, PipelineHealth, PipelineStage, VideoPipeline};
use vidflow::recorder::StreamDump;

mod script;

use script::StreamScript;

fn cli() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("script")
                .short('s')
                .long("script")
                .value_name("FILE")
                .help("JSON stream script to play (a built-in two segment demo otherwise).")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON file with decoder options.")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("framedrop")
                .long("framedrop")
                .help("Let the decoder skip frames to catch up.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .value_name("SECONDS")
                .help("Drop every frame before this time (precise seek).")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("record")
                .short('r')
                .long("record")
                .value_name("FILE")
                .help("Dump every packet sent to the decoder into FILE.")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("decoders")
                .long("decoders")
                .value_name("LIST")
                .help("Decoder selection, e.g. \"rawvideo,-\" (overrides the config file)."),
        )
        .arg(
            Arg::new("list-decoders")
                .long("list-decoders")
                .help("Print the available decoders and exit.")
                .action(ArgAction::SetTrue),
        )
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();

    if matches.get_flag("list-decoders") {
        for entry in decoder_list(&default_drivers()) {
            println!("{}", entry);
        }
        return;
    }

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start the async runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(play(&matches)) {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn play(matches: &ArgMatches) -> Result<()> {
    let mut opts = match matches.get_one::<PathBuf>("config") {
        Some(path) => DecoderOptions::from_json_file(path)?,
        None => DecoderOptions::default(),
    };
    if let Some(selection) = matches.get_one::<String>("decoders") {
        opts.video_decoders = Some(selection.clone());
    }

    let script = match matches.get_one::<PathBuf>("script") {
        Some(path) => StreamScript::from_json_file(path)?,
        None => StreamScript::demo(),
    };
    let (codec, packets) = script.packets()?;
    info!(
        "Playing {} packets in {} segments",
        packets.len(),
        script.segments.len()
    );

    let (tx, feed) = packet_channel(8);
    let wakeup = feed.wakeup();
    let health = Arc::new(PipelineHealth::new());

    let mut pipeline = VideoPipeline::open(
        codec,
        default_drivers(),
        Box::new(feed),
        opts,
        Arc::clone(&health),
    )
    .context("opening the video decoder")?;
    pipeline.set_framedrop_enabled(matches.get_flag("framedrop"));
    pipeline.set_start_pts(matches.get_one::<f64>("start").map(|s| Timestamp::from_secs(*s)));
    if let Some(path) = matches.get_one::<PathBuf>("record") {
        pipeline.attach_recorder(Box::new(StreamDump::create(path)?));
    }

    let mut stage = DecodeStage::new(pipeline, wakeup);
    let mut frames_rx = stage.take_output(8);

    let producer = tokio::spawn(async move {
        for packet in packets {
            if tx.send(packet).await.is_err() {
                break;
            }
        }
    });

    let consumer = tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(frame) = frames_rx.recv().await {
            count += 1;
            debug!(
                "Frame {} pts={} {} ({} bytes)",
                count,
                frame.pts.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                frame.params,
                frame.size()
            );
        }
        count
    });

    stage.run().await?;
    // Closes the frame channel so the consumer can finish.
    drop(stage);

    producer.await.context("packet producer failed")?;
    let frames = consumer.await.context("frame consumer failed")?;

    info!("Done: {} frames", frames);
    info!("{}", health.summary());
    Ok(())
}
