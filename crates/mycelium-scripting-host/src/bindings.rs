//! Host capabilities handed to script handlers as Lua userdata.
//!
//! Scripts call these with method syntax, e.g. `event:reply("hi")` or
//! `storage:query("SELECT ...", id)`.

use mlua::{
    AnyUserData, Lua, LuaSerdeExt, SerializeOptions, UserData, UserDataFields, UserDataMethods,
    Value, Variadic,
};
use mycelium_events::{ChatPlatform, Embed, EmbedField, InboundMessage, Reply, ReplyTarget};
use mycelium_services::{
    format, format_duration, parse_duration, AudioManager, HttpClient, SqlValue, Storage,
    TimeUnit, Track,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::scheduler::{TaskScheduler, TimerId};

/// Everything a handler invocation can reach
#[derive(Clone)]
pub struct HostServices {
    pub platform: Arc<dyn ChatPlatform>,
    pub storage: Arc<Storage>,
    pub http: Arc<HttpClient>,
    pub audio: Arc<AudioManager>,
    pub scheduler: TaskScheduler,
}

impl HostServices {
    /// The six handles that follow the event argument in every signature:
    /// utilities, storage, http, audio, scheduler, time
    pub fn handles(&self) -> (UtilsHandle, StorageHandle, HttpHandle, AudioHandle, SchedulerHandle, TimeHandle) {
        (
            UtilsHandle,
            StorageHandle(Arc::clone(&self.storage)),
            HttpHandle(Arc::clone(&self.http)),
            AudioHandle(Arc::clone(&self.audio)),
            SchedulerHandle(self.scheduler.clone()),
            TimeHandle,
        )
    }

    pub fn message_handle(&self, message: InboundMessage) -> MessageHandle {
        MessageHandle {
            message,
            platform: Arc::clone(&self.platform),
        }
    }

    pub fn platform_handle(&self) -> PlatformHandle {
        PlatformHandle(Arc::clone(&self.platform))
    }
}

/// Convert a JSON payload to a Lua value, mapping JSON null to nil
pub fn json_to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

/// Accept either a string or an embed built with `utils:embed(...)`
fn to_reply(lua: &Lua, value: Value) -> mlua::Result<Reply> {
    match value {
        Value::UserData(ud) if ud.is::<LuaEmbed>() => Ok(Reply::Embed(ud.borrow::<LuaEmbed>()?.0.clone())),
        other => Ok(Reply::Text(lua.unpack::<String>(other)?)),
    }
}

// ============================================================================
// Message and platform
// ============================================================================

/// The inbound message behind a command invocation
pub struct MessageHandle {
    message: InboundMessage,
    platform: Arc<dyn ChatPlatform>,
}

impl UserData for MessageHandle {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("content", |_, this| Ok(this.message.content.clone()));
        fields.add_field_method_get("author_id", |_, this| Ok(this.message.author.id));
        fields.add_field_method_get("author_name", |_, this| Ok(this.message.author.name.clone()));
        fields.add_field_method_get("channel_id", |_, this| Ok(this.message.channel_id));
        fields.add_field_method_get("guild_id", |_, this| Ok(this.message.guild_id));
        fields.add_field_method_get("message_id", |_, this| Ok(this.message.message_id));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("reply", |lua, this, content: Value| {
            let reply = to_reply(lua, content)?;
            this.platform.send(this.message.reply_target(), reply);
            Ok(())
        });

        methods.add_method("send", |lua, this, content: Value| {
            let reply = to_reply(lua, content)?;
            this.platform.send(ReplyTarget::channel(this.message.channel_id), reply);
            Ok(())
        });
    }
}

/// Platform access for scheduled tasks, which have no triggering message
pub struct PlatformHandle(Arc<dyn ChatPlatform>);

impl UserData for PlatformHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("send", |lua, this, (channel_id, content): (u64, Value)| {
            let reply = to_reply(lua, content)?;
            this.0.send(ReplyTarget::channel(channel_id), reply);
            Ok(())
        });

        methods.add_method("latency_ms", |_, this, ()| {
            Ok(this.0.gateway_latency().map(|d| d.as_millis() as u64))
        });
    }
}

// ============================================================================
// Utilities
// ============================================================================

#[derive(Debug, Clone)]
pub struct LuaEmbed(pub Embed);

impl UserData for LuaEmbed {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_function(
            "field",
            |_, (ud, name, value, inline): (AnyUserData, String, String, Option<bool>)| {
                ud.borrow_mut::<LuaEmbed>()?.0.fields.push(EmbedField {
                    name,
                    value,
                    inline: inline.unwrap_or(false),
                });
                Ok(ud)
            },
        );

        methods.add_function("footer", |_, (ud, text): (AnyUserData, String)| {
            ud.borrow_mut::<LuaEmbed>()?.0.footer = Some(text);
            Ok(ud)
        });

        methods.add_function("color", |_, (ud, color): (AnyUserData, u32)| {
            ud.borrow_mut::<LuaEmbed>()?.0.color = color;
            Ok(ud)
        });

        methods.add_function("timestamp", |_, ud: AnyUserData| {
            ud.borrow_mut::<LuaEmbed>()?.0.timestamp = true;
            Ok(ud)
        });
    }
}

/// Embed builders and chat markup helpers
pub struct UtilsHandle;

impl UserData for UtilsHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method(
            "embed",
            |_, _, (title, description, color): (String, String, Option<u32>)| {
                let mut embed = Embed::info(title, description);
                if let Some(color) = color {
                    embed.color = color;
                }
                Ok(LuaEmbed(embed))
            },
        );
        methods.add_method("success_embed", |_, _, (title, description): (String, String)| {
            Ok(LuaEmbed(Embed::success(title, description)))
        });
        methods.add_method("error_embed", |_, _, (title, description): (String, String)| {
            Ok(LuaEmbed(Embed::error(title, description)))
        });
        methods.add_method("info_embed", |_, _, (title, description): (String, String)| {
            Ok(LuaEmbed(Embed::info(title, description)))
        });
        methods.add_method("warning_embed", |_, _, (title, description): (String, String)| {
            Ok(LuaEmbed(Embed::warning(title, description)))
        });

        methods.add_method("mention_user", |_, _, id: u64| Ok(format::mention_user(id)));
        methods.add_method("mention_role", |_, _, id: u64| Ok(format::mention_role(id)));
        methods.add_method("mention_channel", |_, _, id: u64| Ok(format::mention_channel(id)));
        methods.add_method("timestamp", |_, _, (epoch, style): (i64, Option<String>)| {
            Ok(format::timestamp(epoch, style.as_deref().unwrap_or("f")))
        });
        methods.add_method("relative_time", |_, _, epoch: i64| Ok(format::relative_time(epoch)));
    }
}

// ============================================================================
// Storage
// ============================================================================

fn to_sql_value(value: Value) -> mlua::Result<SqlValue> {
    Ok(match value {
        Value::Nil => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(b)),
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Number(n) => SqlValue::Real(n),
        Value::String(s) => SqlValue::Text(s.to_str()?.to_string()),
        other => {
            return Err(mlua::Error::runtime(format!(
                "cannot bind a {} as a query parameter",
                other.type_name()
            )))
        }
    })
}

fn to_sql_params(params: Variadic<Value>) -> mlua::Result<Vec<SqlValue>> {
    params.into_iter().map(to_sql_value).collect()
}

pub struct StorageHandle(Arc<Storage>);

impl UserData for StorageHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("execute", |_, this, (sql, params): (String, Variadic<Value>)| {
            this.0
                .execute(&sql, &to_sql_params(params)?)
                .map_err(mlua::Error::external)
        });

        methods.add_method("execute_async", |_, this, (sql, params): (String, Variadic<Value>)| {
            this.0.execute_async(sql, to_sql_params(params)?);
            Ok(())
        });

        methods.add_method("query", |lua, this, (sql, params): (String, Variadic<Value>)| {
            let rows = this
                .0
                .query(&sql, &to_sql_params(params)?)
                .map_err(mlua::Error::external)?;

            let result = lua.create_table()?;
            for (idx, row) in rows.into_iter().enumerate() {
                let record = lua.create_table()?;
                for (column, value) in row {
                    if let JsonValue::String(text) = value {
                        record.set(column, text)?;
                    }
                }
                result.set(idx + 1, record)?;
            }
            Ok(result)
        });

        methods.add_method("query_single", |_, this, (sql, params): (String, Variadic<Value>)| {
            this.0
                .query_single(&sql, &to_sql_params(params)?)
                .map_err(mlua::Error::external)
        });

        methods.add_method("exists", |_, this, (sql, params): (String, Variadic<Value>)| {
            this.0
                .exists(&sql, &to_sql_params(params)?)
                .map_err(mlua::Error::external)
        });
    }
}

// ============================================================================
// HTTP, audio, scheduler, time
// ============================================================================

pub struct HttpHandle(Arc<HttpClient>);

impl UserData for HttpHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("get", |_, this, url: String| Ok(this.0.get(&url)));
        methods.add_method("post", |_, this, (url, body): (String, String)| {
            Ok(this.0.post_json(&url, &body))
        });
        methods.add_method(
            "post_form",
            |_, this, (url, fields): (String, HashMap<String, String>)| Ok(this.0.post_form(&url, &fields)),
        );
    }
}

pub struct AudioHandle(Arc<AudioManager>);

impl UserData for AudioHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method(
            "enqueue",
            |_, this, (guild_id, query, requester): (u64, String, Option<u64>)| {
                let track = Track {
                    query,
                    requested_by: requester.unwrap_or_default(),
                };
                this.0.enqueue(guild_id, track).map_err(mlua::Error::external)
            },
        );
        methods.add_method("skip", |_, this, guild_id: u64| {
            Ok(this.0.skip(guild_id).map(|t| t.query))
        });
        methods.add_method("clear", |_, this, guild_id: u64| Ok(this.0.clear(guild_id)));
        methods.add_method("now_playing", |_, this, guild_id: u64| {
            Ok(this.0.now_playing(guild_id).map(|t| t.query))
        });
        methods.add_method("queue", |_, this, guild_id: u64| {
            Ok(this
                .0
                .snapshot(guild_id)
                .queue
                .into_iter()
                .map(|t| t.query)
                .collect::<Vec<_>>())
        });
        methods.add_method("set_volume", |_, this, (guild_id, volume): (u64, i64)| {
            Ok(this.0.set_volume(guild_id, volume))
        });
        methods.add_method("volume", |_, this, guild_id: u64| Ok(this.0.snapshot(guild_id).volume));
    }
}

fn parse_unit(unit: Option<String>) -> mlua::Result<TimeUnit> {
    match unit {
        Some(unit) => unit.parse().map_err(mlua::Error::runtime),
        None => Ok(TimeUnit::Seconds),
    }
}

pub struct SchedulerHandle(TaskScheduler);

impl UserData for SchedulerHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method(
            "schedule_once",
            |_, this, (script, handler, delay, unit): (String, String, u64, Option<String>)| {
                let delay = parse_unit(unit)?.to_duration(delay);
                this.0
                    .schedule_once(&script, &handler, delay)
                    .map(TimerId::get)
                    .map_err(mlua::Error::external)
            },
        );

        methods.add_method(
            "schedule_repeating",
            |_,
             this,
             (script, handler, initial, period, unit): (String, String, u64, u64, Option<String>)| {
                let unit = parse_unit(unit)?;
                this.0
                    .schedule_repeating(&script, &handler, unit.to_duration(initial), unit.to_duration(period))
                    .map(TimerId::get)
                    .map_err(mlua::Error::external)
            },
        );

        methods.add_method("cancel", |_, this, id: u64| Ok(this.0.cancel(TimerId::from(id))));
        methods.add_method("active_count", |_, this, ()| Ok(this.0.active_count()));
    }
}

pub struct TimeHandle;

impl UserData for TimeHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("parse_duration", |_, _, text: String| Ok(parse_duration(&text)));
        methods.add_method("format_duration", |_, _, seconds: i64| Ok(format_duration(seconds)));
    }
}
