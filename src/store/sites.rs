use super::{dedupe_by_id, merge_by_id, to_record, upsert_by_id, DomainStore};
use crate::bus::ChangeKind;
use crate::constants::keys;
use crate::error::AppError;
use crate::models::{BlockMode, BlockedSite};
use crate::remote::{Effect, Entity};
use crate::validation::{validate_site_name, validate_site_url};
use serde_json::json;

impl DomainStore {
    /// Stored sites, sanitized and with duplicate ids collapsed.
    pub fn blocked_sites(&self) -> Vec<BlockedSite> {
        dedupe_by_id(self.read_collection(keys::BLOCKED_SITES, BlockedSite::from_value), |s| {
            s.id.as_str()
        })
    }

    /// Sites that must be blocked given whether a session is running.
    pub fn effective_blocked_sites(&self, session_active: bool) -> Vec<BlockedSite> {
        self.blocked_sites()
            .into_iter()
            .filter(|s| s.is_effective(session_active))
            .collect()
    }

    /// Whether any site is blocked outside of focus sessions.
    pub fn has_persistent_sites(&self) -> bool {
        self.blocked_sites()
            .iter()
            .any(|s| s.is_enabled && s.block_mode == BlockMode::Always)
    }

    pub fn save_blocked_site(&self, mut site: BlockedSite) -> Result<BlockedSite, AppError> {
        site.name = validate_site_name(&site.name)?.to_string();
        site.url = validate_site_url(&site.url)?.to_string();
        if site.id.trim().is_empty() {
            site.id = uuid::Uuid::new_v4().to_string();
        }

        let inserted = {
            let _guard = self.lock_writes();
            let mut sites = self.blocked_sites();
            let inserted = upsert_by_id(&mut sites, site.clone(), |s| s.id.as_str());
            self.write_json(keys::BLOCKED_SITES, &sites)?;
            inserted
        };

        self.publish(ChangeKind::BlockedSites);
        let record = to_record(&site);
        self.emit(|owner| {
            if inserted {
                Effect::Create {
                    entity: Entity::BlockedSites,
                    owner,
                    record,
                }
            } else {
                Effect::Update {
                    entity: Entity::BlockedSites,
                    id: site.id.clone(),
                    partial: record,
                }
            }
        });
        Ok(site)
    }

    pub fn delete_blocked_site(&self, id: &str) -> Result<(), AppError> {
        {
            let _guard = self.lock_writes();
            let mut sites = self.blocked_sites();
            let before = sites.len();
            sites.retain(|s| s.id != id);
            if sites.len() == before {
                return Err(AppError::NotFound { entity: "Blocked site" });
            }
            self.write_json(keys::BLOCKED_SITES, &sites)?;
        }

        self.publish(ChangeKind::BlockedSites);
        self.emit(|_| Effect::Delete {
            entity: Entity::BlockedSites,
            id: id.to_string(),
        });
        Ok(())
    }

    pub fn toggle_site_enabled(&self, id: &str) -> Result<BlockedSite, AppError> {
        let site = self.modify_site(id, |site| site.is_enabled = !site.is_enabled)?;
        self.emit(|_| Effect::Update {
            entity: Entity::BlockedSites,
            id: site.id.clone(),
            partial: json!({ "isEnabled": site.is_enabled }),
        });
        Ok(site)
    }

    pub fn toggle_site_block_mode(&self, id: &str) -> Result<BlockedSite, AppError> {
        let site = self.modify_site(id, |site| site.block_mode = site.block_mode.toggled())?;
        self.emit(|_| Effect::Update {
            entity: Entity::BlockedSites,
            id: site.id.clone(),
            partial: json!({ "blockMode": site.block_mode }),
        });
        Ok(site)
    }

    /// Replace the whole collection. Local only: nothing is sent remotely.
    pub fn set_blocked_sites(&self, sites: Vec<BlockedSite>) -> Result<(), AppError> {
        let sites = dedupe_by_id(sites, |s| s.id.as_str());
        {
            let _guard = self.lock_writes();
            self.write_json(keys::BLOCKED_SITES, &sites)?;
        }
        self.publish(ChangeKind::BlockedSites);
        Ok(())
    }

    fn modify_site(&self, id: &str, change: impl FnOnce(&mut BlockedSite)) -> Result<BlockedSite, AppError> {
        let modified = {
            let _guard = self.lock_writes();
            let mut sites = self.blocked_sites();
            let site = sites
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(AppError::NotFound { entity: "Blocked site" })?;
            change(site);
            let modified = site.clone();
            self.write_json(keys::BLOCKED_SITES, &sites)?;
            modified
        };
        self.publish(ChangeKind::BlockedSites);
        Ok(modified)
    }

    pub(crate) fn merge_remote_sites(&self, remote: Vec<BlockedSite>) -> Result<usize, AppError> {
        let applied = {
            let _guard = self.lock_writes();
            let mut sites = self.blocked_sites();
            let applied = merge_by_id(&mut sites, remote, |s| s.id.as_str());
            self.write_json(keys::BLOCKED_SITES, &sites)?;
            applied
        };
        self.publish(ChangeKind::BlockedSites);
        Ok(applied)
    }
}
