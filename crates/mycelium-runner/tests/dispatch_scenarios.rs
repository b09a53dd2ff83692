//! Message-to-reply scenarios through a fully assembled bot

use mycelium_config::MyceliumConfig;
use mycelium_events::testing::RecordingPlatform;
use mycelium_events::{InboundMessage, Sender};
use mycelium_runner::{Bot, Builtin, DispatchOutcome, ManualClock};
use mycelium_services::Storage;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Barrier;

const OWNER: u64 = 1000;
const START_MS: i64 = 1_700_000_000_000;

const DICE_SCRIPT: &str = r#"--[[
[
  { "prefix": "user", "name": "roll", "handler": "rollDice",
    "description": "rolls dice, e.g. 2d6" },
  { "prefix": "user", "name": "ping", "handler": "shadowPing",
    "description": "script ping" }
]
]]
function rollDice(event, utils, storage, http, audio, scheduler, time, commandName, args)
  event:reply(commandName .. ":" .. args)
end

function shadowPing(event, utils, commandName, args)
  event:reply("script ping")
end
"#;

struct Harness {
    bot: Bot,
    platform: Arc<RecordingPlatform>,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl Harness {
    fn script_dir(&self) -> &Path {
        self._dir.path()
    }

    async fn send(&self, author: Sender, content: &str) -> DispatchOutcome {
        let mut message = InboundMessage::new(10, Some(1), author, content);
        message.message_id = 77;
        self.bot.dispatcher().handle_message(&message).await
    }

    async fn wait_for_replies(&self, count: usize) {
        for _ in 0..500 {
            if self.platform.sent().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} replies, saw {:?}", self.platform.sent_text());
    }
}

async fn start(scripts: &[(&str, &str)]) -> Harness {
    let dir = TempDir::new().unwrap();
    for (name, source) in scripts {
        fs::write(dir.path().join(name), source).unwrap();
    }

    let mut config = MyceliumConfig::default();
    config.scripting.script_dir = Some(dir.path().to_path_buf());
    config.commands.owner_ids = vec![OWNER];

    let platform = Arc::new(RecordingPlatform::with_latency(Duration::from_millis(42)));
    let clock = Arc::new(ManualClock::new(START_MS));
    let bot = Bot::builder(config)
        .with_platform(platform.clone())
        .with_clock(clock.clone())
        .with_storage(Arc::new(Storage::open_in_memory().unwrap()))
        .without_background_tasks()
        .start()
        .await
        .unwrap();

    Harness {
        bot,
        platform,
        clock,
        _dir: dir,
    }
}

fn alice() -> Sender {
    Sender::new(1, "alice")
}

#[tokio::test]
async fn test_ping_is_answered_natively() {
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;

    let outcome = harness.send(alice(), "$ping").await;
    assert_eq!(outcome, DispatchOutcome::Builtin(Builtin::Ping));

    let sent = harness.platform.sent();
    assert_eq!(sent.len(), 1);
    let embed = sent[0].1.as_embed().unwrap();
    assert_eq!(embed.title, "pong! 🏓");
    assert!(embed.description.contains("**gateway:** 42ms"));
    assert_eq!(embed.footer.as_deref(), Some("ping: 42ms | requested by: alice"));
    assert_eq!(sent[0].0.message_id, Some(77));
}

#[tokio::test]
async fn test_unknown_command_points_to_help() {
    let harness = start(&[]).await;

    let outcome = harness.send(alice(), "$foo bar").await;
    assert_eq!(outcome, DispatchOutcome::NotFound);
    assert_eq!(
        harness.platform.sent_text(),
        vec!["command not found: the command `foo` was not found. use `$help` for available commands."]
    );

    // Not found does not start a cooldown
    assert_eq!(harness.send(alice(), "$foo").await, DispatchOutcome::NotFound);
}

#[tokio::test]
async fn test_repeat_within_cooldown_is_dropped_silently() {
    let harness = start(&[]).await;

    assert_eq!(harness.send(alice(), "$play x").await, DispatchOutcome::Builtin(Builtin::Play));
    harness.clock.advance(Duration::from_millis(500));
    assert_eq!(harness.send(alice(), "$play y").await, DispatchOutcome::CooldownActive);
    assert_eq!(harness.platform.sent().len(), 1);

    // Another user is unaffected
    assert_eq!(
        harness.send(Sender::new(2, "bob"), "$play y").await,
        DispatchOutcome::Builtin(Builtin::Play)
    );

    harness.clock.advance(Duration::from_secs(3));
    assert_eq!(harness.send(alice(), "$play z").await, DispatchOutcome::Builtin(Builtin::Play));
    harness.clock.advance(Duration::from_secs(1));
    assert_eq!(harness.send(alice(), "$play again").await, DispatchOutcome::CooldownActive);

    let snapshot = harness.bot.audio().snapshot(1);
    assert_eq!(snapshot.now_playing.unwrap().query, "x");
    let queued: Vec<_> = snapshot.queue.iter().map(|t| t.query.as_str()).collect();
    assert_eq!(queued, vec!["y", "z"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_repeats_delegate_once() {
    const TASKS: usize = 8;
    const ROUNDS: usize = 5;
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;

    for round in 0..ROUNDS {
        let barrier = Arc::new(Barrier::new(TASKS));
        let tasks: Vec<_> = (0..TASKS)
            .map(|_| {
                let dispatcher = Arc::clone(harness.bot.dispatcher());
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    let message = InboundMessage::new(10, Some(1), alice(), "$roll 2d6");
                    barrier.wait().await;
                    dispatcher.handle_message(&message).await
                })
            })
            .collect();

        let mut delegated = 0;
        for task in tasks {
            match task.await.unwrap() {
                DispatchOutcome::Delegated { handlers: 1 } => delegated += 1,
                DispatchOutcome::CooldownActive => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(delegated, 1, "round {round}");
        harness.clock.advance(Duration::from_secs(3));
    }

    harness.wait_for_replies(ROUNDS).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.platform.sent_text(), vec!["roll:2d6"; ROUNDS]);
}

#[tokio::test]
async fn test_failed_submit_leaves_no_cooldown() {
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;
    harness.bot.worker().shutdown(Duration::from_secs(5)).await;

    assert_eq!(harness.send(alice(), "$roll 1d4").await, DispatchOutcome::WorkerUnavailable);
    assert_eq!(harness.send(alice(), "$roll 1d4").await, DispatchOutcome::WorkerUnavailable);
    assert!(!harness.bot.dispatcher().cooldowns().is_active(alice().id, "roll", START_MS));
}

#[tokio::test]
async fn test_script_command_gets_name_and_args() {
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;

    let outcome = harness.send(alice(), "$ROLL 2d6").await;
    assert_eq!(outcome, DispatchOutcome::Delegated { handlers: 1 });

    harness.wait_for_replies(1).await;
    assert_eq!(harness.platform.sent_text(), vec!["roll:2d6"]);
}

#[tokio::test]
async fn test_builtins_shadow_script_commands() {
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;

    assert_eq!(harness.send(alice(), "$ping").await, DispatchOutcome::Builtin(Builtin::Ping));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.platform.sent_text().contains(&"script ping".to_string()));
}

#[tokio::test]
async fn test_help_lists_builtins_and_script_descriptions() {
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;

    harness.send(alice(), "$help").await;
    let sent = harness.platform.sent();
    let embed = sent[0].1.as_embed().unwrap();

    assert_eq!(embed.title, "mycelium bot help");
    let user = &embed.fields[0];
    assert_eq!(user.name, "user commands");
    assert!(user.value.contains("`$roll` - rolls dice, e.g. 2d6\n"));
    assert!(user.value.contains("`$ping` - checks bot latency and response time\n"));
    assert!(!user.value.contains("script ping"));

    let lines: Vec<&str> = user.value.lines().collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);

    assert_eq!(embed.fields[1].name, "moderation commands");
    assert!(embed.fields[1].value.contains("`#reload` - reloads all scripts (owner only)"));
    assert_eq!(embed.fields[2].name, "need more help?");
}

#[tokio::test]
async fn test_reload_is_owner_only_and_rebuilds_registry() {
    let harness = start(&[("dice.lua", DICE_SCRIPT)]).await;

    let admin = Sender::new(2, "admin").elevated();
    assert_eq!(harness.send(admin, "#reload").await, DispatchOutcome::PermissionDenied);
    assert_eq!(
        harness.platform.sent_text(),
        vec!["permission denied: only bot owners can reload scripts."]
    );
    let generation = harness.bot.worker().registry().generation();

    fs::remove_file(harness.script_dir().join("dice.lua")).unwrap();
    harness.platform.clear();

    let owner = Sender::new(OWNER, "owner");
    assert_eq!(harness.send(owner.clone(), "#reload").await, DispatchOutcome::Builtin(Builtin::Reload));
    assert_eq!(
        harness.platform.sent_text(),
        vec!["reload complete: all scripts have been reloaded successfully."]
    );
    assert!(harness.bot.worker().registry().generation() > generation);

    assert_eq!(harness.send(owner, "$roll 2d6").await, DispatchOutcome::NotFound);
}

#[tokio::test]
async fn test_mod_commands_need_elevation() {
    let harness = start(&[]).await;

    assert_eq!(harness.send(alice(), "#clean 5").await, DispatchOutcome::PermissionDenied);
    assert_eq!(
        harness.platform.sent_text(),
        vec!["permission denied: you don't have permission to use this command."]
    );
    assert!(harness.platform.purges().is_empty());

    // A denial does not start a cooldown
    let moderator = Sender::new(1, "alice").elevated();
    assert_eq!(harness.send(moderator.clone(), "#clean 5").await, DispatchOutcome::Builtin(Builtin::Clean));
    assert_eq!(harness.platform.purges(), vec![(10, 6)]);

    harness.clock.advance(Duration::from_secs(5));
    harness.platform.clear();
    harness.send(moderator.clone(), "#clean 500").await;
    assert_eq!(
        harness.platform.sent_text(),
        vec!["invalid amount: please specify a number between 1 and 100."]
    );

    harness.clock.advance(Duration::from_secs(5));
    harness.platform.clear();
    harness.send(moderator, "#clean lots").await;
    assert_eq!(harness.platform.sent_text(), vec!["usage: `#clean <number of messages>`"]);
}

#[tokio::test]
async fn test_bots_webhooks_and_direct_messages_are_ignored() {
    let harness = start(&[]).await;

    let mut bot = Sender::new(5, "other-bot");
    bot.bot = true;
    assert_eq!(harness.send(bot, "$ping").await, DispatchOutcome::Ignored);

    let mut webhook = InboundMessage::new(10, Some(1), alice(), "$ping");
    webhook.webhook = true;
    assert_eq!(harness.bot.dispatcher().handle_message(&webhook).await, DispatchOutcome::Ignored);

    let direct = InboundMessage::new(10, None, alice(), "$ping");
    assert_eq!(harness.bot.dispatcher().handle_message(&direct).await, DispatchOutcome::Ignored);

    assert_eq!(harness.send(alice(), "just chatting").await, DispatchOutcome::Ignored);
    assert!(harness.platform.sent().is_empty());
}

#[tokio::test]
async fn test_ready_event_reaches_script() {
    let script = r#"--[[ [{"event": "READY", "handler": "onReady"}] ]]
function onReady(event, utils, storage, http, audio, scheduler, time)
  storage:execute("INSERT INTO guild_settings (guild_id, welcome_channel) VALUES (?, ?)",
    "ready", event.user_name .. ":" .. event.guild_count)
end
"#;
    let harness = start(&[("ready.lua", script)]).await;

    assert!(harness.bot.events().ready(9, "mycelium", 3));
    assert!(!harness.bot.events().member_joined(1, 2, "nobody"));

    let storage = harness.bot.storage().clone();
    for _ in 0..500 {
        if storage.exists("SELECT 1 FROM guild_settings WHERE guild_id = 'ready'", &[]).unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let welcome = storage
        .query_single("SELECT welcome_channel FROM guild_settings WHERE guild_id = 'ready'", &[])
        .unwrap();
    assert_eq!(welcome.as_deref(), Some("mycelium:3"));
}

#[tokio::test]
async fn test_shutdown_stops_worker() {
    let harness = start(&[]).await;
    let worker = harness.bot.worker().clone();
    harness.bot.shutdown().await;
    assert!(worker.request_load().is_err());
}
