// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing table construction, validation, and lookup.

use std::collections::{HashMap, HashSet};

use relay_config::ConfigError;
use relay_config::model::{RelayConfig, RouteConfig};
use relay_core::{MessageScope, ScopeType};
use strum::Display;
use tracing::{debug, warn};

/// Which precedence tier produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RouteTier {
    DmUser,
    Channel,
    Guild,
    Default,
}

/// The backend a message is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub backend_bot_id: String,
    pub tier: RouteTier,
}

/// Scoped routes for one chat bot, keyed by scope id.
#[derive(Debug, Default, Clone)]
struct ChatBotRoutes {
    dm_user: HashMap<String, String>,
    channel: HashMap<String, String>,
    guild: HashMap<String, String>,
    default: Option<String>,
}

impl ChatBotRoutes {
    fn table_mut(&mut self, scope: ScopeType) -> &mut HashMap<String, String> {
        match scope {
            ScopeType::DmUser => &mut self.dm_user,
            ScopeType::Channel => &mut self.channel,
            ScopeType::Guild => &mut self.guild,
        }
    }
}

/// Static routing table. Immutable after construction.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    bots: HashMap<String, ChatBotRoutes>,
}

impl RoutingTable {
    /// Build and validate the routing table from configuration.
    ///
    /// Rejects, collecting every problem:
    /// - two routes with the same (chat bot, scope type, scope id),
    /// - routes or defaults naming an unknown chat bot or backend bot.
    ///
    /// Routes pointing at a disabled backend are accepted with a warning; the
    /// deliveries wait in the queue until the backend is enabled again.
    pub fn from_config(config: &RelayConfig) -> Result<Self, Vec<ConfigError>> {
        let chat_ids: Vec<&str> = config.chat_bots.iter().map(|b| b.id.as_str()).collect();
        let backend_ids: Vec<&str> = config.backend_bots.iter().map(|b| b.id.as_str()).collect();
        let disabled: HashSet<&str> = config
            .backend_bots
            .iter()
            .filter(|b| !b.enabled)
            .map(|b| b.id.as_str())
            .collect();

        let mut errors = Vec::new();
        let mut bots: HashMap<String, ChatBotRoutes> = HashMap::new();

        for (i, route) in config.routes.iter().enumerate() {
            let refs_ok = check_reference(
                &mut errors,
                format!("routes[{i}].chat_bot_id"),
                "chat bot",
                &route.chat_bot_id,
                &chat_ids,
            ) & check_reference(
                &mut errors,
                format!("routes[{i}].backend_bot_id"),
                "backend bot",
                &route.backend_bot_id,
                &backend_ids,
            );
            if !refs_ok {
                continue;
            }

            warn_if_disabled(&disabled, &route.backend_bot_id, &route.chat_bot_id);
            insert_route(&mut bots, route, &mut errors);
        }

        for (chat_bot_id, backend_bot_id) in &config.routing.defaults {
            let refs_ok = check_reference(
                &mut errors,
                "routing.defaults".to_string(),
                "chat bot",
                chat_bot_id,
                &chat_ids,
            ) & check_reference(
                &mut errors,
                format!("routing.defaults.{chat_bot_id}"),
                "backend bot",
                backend_bot_id,
                &backend_ids,
            );
            if refs_ok {
                warn_if_disabled(&disabled, backend_bot_id, chat_bot_id);
                bots.entry(chat_bot_id.clone()).or_default().default = Some(backend_bot_id.clone());
            }
        }

        if errors.is_empty() {
            debug!(
                routes = config.routes.len(),
                defaults = config.routing.defaults.len(),
                "routing table built"
            );
            Ok(Self { bots })
        } else {
            Err(errors)
        }
    }

    /// Resolve the backend for a message observed by `chat_bot_id`.
    ///
    /// Tiers are tried in order `dm_user > channel > guild > default`; the
    /// first hit wins. A DM is matched on its author, a guild message on its
    /// channel and then its guild. `None` means the message is kept for audit
    /// but delivered to nobody.
    pub fn route(&self, chat_bot_id: &str, scope: &MessageScope) -> Option<RouteDecision> {
        let routes = self.bots.get(chat_bot_id)?;

        let hit = |table: &HashMap<String, String>, key: Option<&str>, tier| {
            key.and_then(|k| table.get(k)).map(|backend| RouteDecision {
                backend_bot_id: backend.clone(),
                tier,
            })
        };

        let dm_key = scope.is_dm.then_some(scope.author_id.as_str());
        let channel_key = if scope.is_dm {
            None
        } else {
            scope.channel_id.as_deref()
        };

        hit(&routes.dm_user, dm_key, RouteTier::DmUser)
            .or_else(|| hit(&routes.channel, channel_key, RouteTier::Channel))
            .or_else(|| hit(&routes.guild, scope.guild_id.as_deref(), RouteTier::Guild))
            .or_else(|| {
                routes.default.as_ref().map(|backend| RouteDecision {
                    backend_bot_id: backend.clone(),
                    tier: RouteTier::Default,
                })
            })
    }

    /// Every backend id some route or default can resolve to.
    pub fn backends(&self) -> HashSet<&str> {
        self.bots
            .values()
            .flat_map(|r| {
                r.dm_user
                    .values()
                    .chain(r.channel.values())
                    .chain(r.guild.values())
                    .chain(r.default.iter())
            })
            .map(String::as_str)
            .collect()
    }
}

fn insert_route(
    bots: &mut HashMap<String, ChatBotRoutes>,
    route: &RouteConfig,
    errors: &mut Vec<ConfigError>,
) {
    let table = bots
        .entry(route.chat_bot_id.clone())
        .or_default()
        .table_mut(route.scope_type);

    match table.get(&route.scope_id) {
        Some(first) => errors.push(ConfigError::AmbiguousRoute {
            chat_bot_id: route.chat_bot_id.clone(),
            scope_type: route.scope_type,
            scope_id: route.scope_id.clone(),
            first: first.clone(),
            second: route.backend_bot_id.clone(),
        }),
        None => {
            table.insert(route.scope_id.clone(), route.backend_bot_id.clone());
        }
    }
}

/// Records an `UnknownReference` unless `id` is in `known`. Returns whether it was.
fn check_reference(
    errors: &mut Vec<ConfigError>,
    location: String,
    kind: &str,
    id: &str,
    known: &[&str],
) -> bool {
    if known.contains(&id) {
        return true;
    }
    let suggestion = known
        .iter()
        .map(|k| (*k, strsim::jaro_winkler(id, k)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k.to_string());
    errors.push(ConfigError::UnknownReference {
        location,
        kind: kind.to_string(),
        id: id.to_string(),
        suggestion,
    });
    false
}

fn warn_if_disabled(disabled: &HashSet<&str>, backend_bot_id: &str, chat_bot_id: &str) {
    if disabled.contains(backend_bot_id) {
        warn!(
            backend_bot_id,
            chat_bot_id, "route targets a disabled backend bot; deliveries will wait in the queue"
        );
    }
}
