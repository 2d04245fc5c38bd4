use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single capability a tool may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageMessages,
    ModerateMembers,
    KickMembers,
    BanMembers,
    ManageGuild,
}

impl Capability {
    /// Human-readable permission name, as the chat platform labels it.
    pub fn label(&self) -> &'static str {
        match self {
            Capability::ManageMessages => "Manage Messages",
            Capability::ModerateMembers => "Timeout Members",
            Capability::KickMembers => "Kick Members",
            Capability::BanMembers => "Ban Members",
            Capability::ManageGuild => "Manage Server",
        }
    }
}

/// What the requesting actor may do. Supplied fresh by the host with every
/// request; the engine never caches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionFlags {
    #[serde(default)]
    pub manage_messages: bool,
    #[serde(default)]
    pub moderate_members: bool,
    #[serde(default)]
    pub kick_members: bool,
    #[serde(default)]
    pub ban_members: bool,
    #[serde(default)]
    pub manage_guild: bool,
}

impl PermissionFlags {
    pub fn all() -> Self {
        Self {
            manage_messages: true,
            moderate_members: true,
            kick_members: true,
            ban_members: true,
            manage_guild: true,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageMessages => self.manage_messages,
            Capability::ModerateMembers => self.moderate_members,
            Capability::KickMembers => self.kick_members,
            Capability::BanMembers => self.ban_members,
            Capability::ManageGuild => self.manage_guild,
        }
    }

    /// Flag names as the model sees them (`can_*`).
    pub fn prompt_flags(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("can_ban_members", self.ban_members),
            ("can_kick_members", self.kick_members),
            ("can_manage_guild", self.manage_guild),
            ("can_manage_messages", self.manage_messages),
            ("can_moderate_members", self.moderate_members),
        ])
    }
}

/// The identity making a request, as reported by the host at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: u64,
    pub display_name: String,
    /// Position of the actor's highest role; higher outranks lower.
    pub rank: i64,
    #[serde(default)]
    pub is_guild_owner: bool,
    #[serde(default)]
    pub permissions: PermissionFlags,
}

/// A guild member resolved through the moderation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Member {
    pub id: u64,
    pub display_name: String,
    pub rank: i64,
    #[serde(default)]
    pub is_guild_owner: bool,
    #[serde(default)]
    pub is_bot: bool,
}

/// One mention descriptor in the model context.
///
/// Positional contract: index 0 is always the bot itself, later entries
/// are candidate targets in the order they appeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MentionInfo {
    pub index: usize,
    #[serde(rename = "id")]
    pub user_id: u64,
    pub is_bot: bool,
    #[serde(rename = "display")]
    pub display_name: String,
}

/// Put the bot first and renumber. The bot entry is synthesized if the
/// host did not include it (proactive replies have no bot mention).
pub fn normalize_mentions(bot_id: u64, bot_name: &str, mentions: &[MentionInfo]) -> Vec<MentionInfo> {
    let bot = mentions
        .iter()
        .find(|m| m.user_id == bot_id)
        .cloned()
        .unwrap_or_else(|| MentionInfo {
            index: 0,
            user_id: bot_id,
            is_bot: true,
            display_name: bot_name.to_string(),
        });

    std::iter::once(bot)
        .chain(mentions.iter().filter(|m| m.user_id != bot_id).cloned())
        .enumerate()
        .map(|(index, mention)| MentionInfo { index, ..mention })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GuildInfo {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
}

/// Where a request came from; used to address replies and purges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Origin {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
}

/// A recent channel message shown to the model for context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryMessage {
    pub author_id: u64,
    pub author_name: String,
    #[serde(default)]
    pub is_bot: bool,
    pub content: String,
}

/// One inbound message delivered by the chat-platform bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InboundRequest {
    pub guild: GuildInfo,
    pub origin: Origin,
    pub actor: Actor,
    pub bot_id: u64,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Raw message text, bot mention included.
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<MentionInfo>,
    /// Most recent last.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

fn default_bot_name() -> String {
    "modgate".to_string()
}

impl InboundRequest {
    pub fn mentions_bot(&self) -> bool {
        self.mentions.iter().any(|m| m.user_id == self.bot_id)
            || self.content.contains(&format!("<@{}>", self.bot_id))
            || self.content.contains(&format!("<@!{}>", self.bot_id))
    }

    /// Message text with the bot's own mention tokens removed.
    pub fn cleaned_content(&self) -> String {
        let mut content = self.content.clone();
        for token in [format!("<@{}>", self.bot_id), format!("<@!{}>", self.bot_id)] {
            content = content.replace(&token, "");
        }
        content.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(index: usize, user_id: u64, is_bot: bool) -> MentionInfo {
        MentionInfo {
            index,
            user_id,
            is_bot,
            display_name: format!("user-{user_id}"),
        }
    }

    #[test]
    fn normalize_mentions_moves_bot_to_index_zero() {
        let mentions = vec![mention(0, 42, false), mention(1, 7, true), mention(2, 99, false)];
        let normalized = normalize_mentions(7, "modgate", &mentions);
        let ids: Vec<u64> = normalized.iter().map(|m| m.user_id).collect();
        assert_eq!(ids, vec![7, 42, 99]);
        let indexes: Vec<usize> = normalized.iter().map(|m| m.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn normalize_mentions_synthesizes_missing_bot_entry() {
        let normalized = normalize_mentions(7, "modgate", &[mention(0, 42, false)]);
        assert_eq!(normalized[0].user_id, 7);
        assert!(normalized[0].is_bot);
        assert_eq!(normalized[0].display_name, "modgate");
        assert_eq!(normalized[1].index, 1);
    }

    #[test]
    fn cleaned_content_strips_both_mention_forms() {
        let request = InboundRequest {
            guild: GuildInfo {
                id: 1,
                name: "g".to_string(),
                member_count: None,
            },
            origin: Origin {
                guild_id: 1,
                channel_id: 2,
                message_id: 3,
            },
            actor: Actor {
                id: 5,
                display_name: "mod".to_string(),
                rank: 10,
                is_guild_owner: false,
                permissions: PermissionFlags::default(),
            },
            bot_id: 7,
            bot_name: "modgate".to_string(),
            content: "<@7> timeout <@42> <@!7>".to_string(),
            mentions: vec![],
            history: vec![],
        };
        assert!(request.mentions_bot());
        assert_eq!(request.cleaned_content(), "timeout <@42>");
    }

    #[test]
    fn permission_flags_expose_can_prefixed_names() {
        let flags = PermissionFlags {
            ban_members: true,
            ..PermissionFlags::default()
        };
        let prompt = flags.prompt_flags();
        assert_eq!(prompt.get("can_ban_members"), Some(&true));
        assert_eq!(prompt.get("can_kick_members"), Some(&false));
        assert_eq!(prompt.len(), 5);
    }
}
