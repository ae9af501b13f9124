use std::sync::Arc;

use anyhow::Result;
use serenity::{
    all::{Context as SerenityContext, GatewayIntents, GuildId, Interaction, Permissions, Ready},
    async_trait,
};
use songbird::{Config as VoiceConfig, Songbird, serenity::SerenityInit};
use tracing::{error, info, warn};

mod commands;
mod cue;
mod env;
mod error;
mod metrics;
mod notify;
mod scheduler;
mod soundboard;
mod state;
mod tones;
mod voice;
mod web;

use crate::{
    cue::StandardRenderer,
    env::Config,
    metrics::METRICS,
    notify::ChannelNotifier,
    scheduler::{JobDeps, TimerScheduler},
    soundboard::SoundboardClient,
    state::AppState,
    voice::SongbirdVoice,
};

fn invite_url(application_id: u64) -> String {
    let perms = Permissions::CONNECT | Permissions::SPEAK;
    format!(
        "https://discord.com/api/oauth2/authorize?client_id={}&permissions={}&scope=bot%20applications.commands",
        application_id,
        perms.bits()
    )
}

struct Handler;

#[async_trait]
impl serenity::prelude::EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!("Logged in as {}", ready.user.name);
        let Some(state) = AppState::from_context(&ctx).await else {
            error!("application state missing from client data");
            return;
        };

        let guild_id = GuildId::new(state.config.guild_id);
        let def = commands::timer::definition(state.config.max_minutes);
        match guild_id.set_commands(&ctx.http, vec![def]).await {
            Ok(cmds) => info!(%guild_id, "registered {} guild command(s)", cmds.len()),
            Err(e) => error!(%guild_id, "failed to register guild commands: {e:?}"),
        }

        info!(
            "Invite this bot: {} (app_id={}, user_id={})",
            invite_url(state.config.application_id),
            state.config.application_id,
            ready.user.id
        );
        METRICS.set_ready(true);
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        let Some(state) = AppState::from_context(&ctx).await else {
            error!("application state missing from client data");
            return;
        };
        match interaction {
            Interaction::Command(cmd) if cmd.data.name == commands::timer::NAME => {
                if let Err(why) = commands::timer::handle(&ctx, &cmd, &state).await {
                    error!("/timer failed: {why:?}");
                }
            }
            Interaction::Autocomplete(cmd) if cmd.data.name == commands::timer::NAME => {
                if let Err(why) = commands::timer::autocomplete(&ctx, &cmd, &state).await {
                    warn!("/timer autocomplete failed: {why:?}");
                }
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if !config.sound_file.exists() {
        warn!(
            "sound file {} not found; the file cue will fail until it exists",
            config.sound_file.display()
        );
    }

    // A single short cue per call, never mixed.
    let voice_cfg = VoiceConfig::default()
        .preallocated_tracks(1)
        .use_softclip(false);
    let manager = Songbird::serenity_from_config(voice_cfg);

    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_VOICE_STATES;
    let mut client = serenity::Client::builder(&config.token, intents)
        .event_handler(Handler)
        .register_songbird_with(manager.clone())
        .await?;

    let soundboard = Arc::new(SoundboardClient::new(&config.token));
    let deps = JobDeps {
        voice: Arc::new(SongbirdVoice::new(
            manager,
            client.cache.clone(),
            client.http.clone(),
        )),
        renderer: Arc::new(StandardRenderer::new(soundboard.clone())),
        notifier: Arc::new(ChannelNotifier::new(client.http.clone())),
        timings: config.timings,
    };
    let scheduler = Arc::new(TimerScheduler::new(deps));
    client
        .data
        .write()
        .await
        .insert::<AppState>(AppState::new(config.clone(), scheduler, soundboard));

    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = web::run_http(port).await {
            error!("HTTP server error: {e}");
        }
    });

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, closing gateway shards");
            METRICS.set_ready(false);
            shard_manager.shutdown_all().await;
        }
    });

    info!("Invite this bot: {}", invite_url(config.application_id));
    info!(
        "Commands: /timer minutes:<1-{}> [role] [sound]",
        config.max_minutes
    );

    if let Err(why) = client.start_autosharded().await {
        error!("Client error: {why:?}");
    }
    Ok(())
}
