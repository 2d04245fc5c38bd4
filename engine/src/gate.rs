use std::collections::BTreeSet;
use std::fmt;

use modgate_core::actor::{Actor, Capability, Member};
use modgate_core::decision::Tool;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    RootTarget,
    SelfTarget,
    GuildOwnerTarget,
    RankNotBelow,
    MissingCapability(Capability),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::RootTarget => f.write_str("that user cannot be moderated"),
            DenyReason::SelfTarget => f.write_str("you cannot moderate yourself"),
            DenyReason::GuildOwnerTarget => f.write_str("the server owner cannot be moderated"),
            DenyReason::RankNotBelow => {
                f.write_str("you cannot moderate someone with an equal or higher role")
            }
            DenyReason::MissingCapability(capability) => {
                write!(f, "you need the {} permission", capability.label())
            }
        }
    }
}

/// Strict allow/deny policy over actor, target and tool.
///
/// Pure: no I/O and no state besides the configured root identities.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    root_ids: BTreeSet<u64>,
}

impl PermissionGate {
    pub fn new(root_ids: BTreeSet<u64>) -> Self {
        Self { root_ids }
    }

    pub fn is_root(&self, user_id: u64) -> bool {
        self.root_ids.contains(&user_id)
    }

    /// Rules apply in order; the first that fails decides the verdict.
    pub fn authorize(&self, actor: &Actor, target: Option<&Member>, tool: Tool) -> Verdict {
        let actor_is_root = self.is_root(actor.id);

        if let Some(target) = target {
            if self.is_root(target.id) && !actor_is_root {
                return Verdict::Deny(DenyReason::RootTarget);
            }
        }
        if actor_is_root {
            return Verdict::Allow;
        }

        if let Some(target) = target {
            if target.id == actor.id {
                return Verdict::Deny(DenyReason::SelfTarget);
            }
            if target.is_guild_owner {
                return Verdict::Deny(DenyReason::GuildOwnerTarget);
            }
            if !actor.is_guild_owner && target.rank >= actor.rank {
                return Verdict::Deny(DenyReason::RankNotBelow);
            }
        }

        match tool.required_capability() {
            Some(capability) if !actor.permissions.has(capability) => {
                Verdict::Deny(DenyReason::MissingCapability(capability))
            }
            _ => Verdict::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgate_core::actor::PermissionFlags;

    const ROOT: u64 = 1;

    fn gate() -> PermissionGate {
        PermissionGate::new(BTreeSet::from([ROOT]))
    }

    fn actor(id: u64, rank: i64, permissions: PermissionFlags) -> Actor {
        Actor {
            id,
            display_name: format!("actor-{id}"),
            rank,
            is_guild_owner: false,
            permissions,
        }
    }

    fn member(id: u64, rank: i64) -> Member {
        Member {
            id,
            display_name: format!("member-{id}"),
            rank,
            is_guild_owner: false,
            is_bot: false,
        }
    }

    #[test]
    fn missing_capability_is_denied_never_downgraded() {
        let mod_actor = actor(10, 5, PermissionFlags {
            moderate_members: true,
            ..PermissionFlags::default()
        });
        let target = member(20, 1);
        assert_eq!(
            gate().authorize(&mod_actor, Some(&target), Tool::Ban),
            Verdict::Deny(DenyReason::MissingCapability(Capability::BanMembers))
        );
        assert_eq!(
            gate().authorize(&mod_actor, Some(&target), Tool::Timeout),
            Verdict::Allow
        );
    }

    #[test]
    fn equal_or_higher_rank_is_denied_for_every_tool() {
        let gate = gate();
        for actor_rank in -3..4 {
            for target_rank in -3..4 {
                if target_rank < actor_rank {
                    continue;
                }
                let mod_actor = actor(10, actor_rank, PermissionFlags::all());
                let target = member(20, target_rank);
                for tool in Tool::ALL {
                    assert_eq!(
                        gate.authorize(&mod_actor, Some(&target), tool),
                        Verdict::Deny(DenyReason::RankNotBelow),
                        "actor {actor_rank} target {target_rank} tool {tool}"
                    );
                }
            }
        }
    }

    #[test]
    fn guild_owner_bypasses_rank_but_not_capabilities() {
        let mut owner = actor(10, 0, PermissionFlags::default());
        owner.is_guild_owner = true;
        let target = member(20, 50);
        assert_eq!(
            gate().authorize(&owner, Some(&target), Tool::Kick),
            Verdict::Deny(DenyReason::MissingCapability(Capability::KickMembers))
        );
        owner.permissions = PermissionFlags::all();
        assert!(gate().authorize(&owner, Some(&target), Tool::Kick).is_allowed());
    }

    #[test]
    fn nobody_but_root_targets_the_guild_owner() {
        let mod_actor = actor(10, 100, PermissionFlags::all());
        let mut owner = member(20, 1);
        owner.is_guild_owner = true;
        assert_eq!(
            gate().authorize(&mod_actor, Some(&owner), Tool::Warn),
            Verdict::Deny(DenyReason::GuildOwnerTarget)
        );
        let root = actor(ROOT, 0, PermissionFlags::default());
        assert!(gate().authorize(&root, Some(&owner), Tool::Warn).is_allowed());
    }

    #[test]
    fn self_targeting_is_denied_except_for_root() {
        let mod_actor = actor(10, 5, PermissionFlags::all());
        assert_eq!(
            gate().authorize(&mod_actor, Some(&member(10, 5)), Tool::Warn),
            Verdict::Deny(DenyReason::SelfTarget)
        );
        let root = actor(ROOT, 5, PermissionFlags::default());
        assert!(gate().authorize(&root, Some(&member(ROOT, 5)), Tool::Warn).is_allowed());
    }

    #[test]
    fn root_cannot_be_targeted_by_non_root() {
        let mut owner = actor(10, 100, PermissionFlags::all());
        owner.is_guild_owner = true;
        assert_eq!(
            gate().authorize(&owner, Some(&member(ROOT, 0)), Tool::Ban),
            Verdict::Deny(DenyReason::RootTarget)
        );
    }

    #[test]
    fn root_passes_without_flags_or_rank() {
        let root = actor(ROOT, 0, PermissionFlags::default());
        for tool in Tool::ALL {
            assert!(gate().authorize(&root, Some(&member(20, 99)), tool).is_allowed());
            assert!(gate().authorize(&root, None, tool).is_allowed());
        }
    }

    #[test]
    fn untargeted_tools_only_check_capability() {
        let plain = actor(10, 5, PermissionFlags::default());
        assert_eq!(
            gate().authorize(&plain, None, Tool::Purge),
            Verdict::Deny(DenyReason::MissingCapability(Capability::ManageMessages))
        );
        assert!(gate().authorize(&plain, None, Tool::ShowHelp).is_allowed());
    }

    #[test]
    fn verdict_is_deterministic() {
        let gate = gate();
        let mod_actor = actor(10, 5, PermissionFlags::all());
        let target = member(20, 3);
        let first = gate.authorize(&mod_actor, Some(&target), Tool::Kick);
        for _ in 0..10 {
            assert_eq!(gate.authorize(&mod_actor, Some(&target), Tool::Kick), first);
        }
    }
}
