//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存失效路由：把业务变更事件映射为需要删除的键集合。

use crate::client::two_level::CacheFacade;
use crate::error::Result;
use crate::keyspace::{KeySpace, LINK_DETAIL, LINK_LIST};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 业务变更事件
///
/// 只能在变更所在的事务提交之后分发
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// 链接变更，可选地带上具体的链接ID
    Link {
        owner: String,
        link_id: Option<String>,
    },
    Folder { owner: String },
    Tag { owner: String },
    User { owner: String },
    /// 影响实体数量不确定的批量写入，删除该所有者的全部缓存
    Bulk { owner: String },
}

impl ChangeEvent {
    pub fn owner(&self) -> &str {
        match self {
            ChangeEvent::Link { owner, .. }
            | ChangeEvent::Folder { owner }
            | ChangeEvent::Tag { owner }
            | ChangeEvent::User { owner }
            | ChangeEvent::Bulk { owner } => owner,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Link { .. } => "link",
            ChangeEvent::Folder { .. } => "folder",
            ChangeEvent::Tag { .. } => "tag",
            ChangeEvent::User { .. } => "user",
            ChangeEvent::Bulk { .. } => "bulk",
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Link {
                owner,
                link_id: Some(id),
            } => write!(f, "link({}, {})", owner, id),
            other => write!(f, "{}({})", other.kind(), other.owner()),
        }
    }
}

/// 一次失效要删除的内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// 精确键，按首次出现顺序去重
    pub keys: Vec<String>,
    /// 键族前缀，删除所有以其开头的键
    pub families: Vec<String>,
}

impl InvalidationPlan {
    fn push(&mut self, key: String) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    fn extend(&mut self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            self.push(key);
        }
    }
}

/// 失效路由
///
/// 实体到视图的依赖关系集中在 `plan` 中，调用方只描述发生了什么
pub struct InvalidationRouter {
    keyspace: KeySpace,
    cache: Arc<CacheFacade>,
}

impl InvalidationRouter {
    pub fn new(keyspace: KeySpace, cache: Arc<CacheFacade>) -> Self {
        Self { keyspace, cache }
    }

    pub fn keyspace(&self) -> &KeySpace {
        &self.keyspace
    }

    /// 计算事件对应的失效计划，不做任何 I/O
    ///
    /// 所有者ID或链接ID不是合法键段时返回 `InvalidKey`
    pub fn plan(&self, event: &ChangeEvent) -> Result<InvalidationPlan> {
        let ks = &self.keyspace;
        let mut plan = InvalidationPlan::default();
        match event {
            ChangeEvent::Link { owner, link_id } => {
                plan.extend(ks.dashboard_keys(owner)?);
                plan.push(ks.tag_counts(owner)?);
                plan.push(ks.user_stats(owner)?);
                if let Some(id) = link_id {
                    plan.push(ks.link_detail(owner, id)?);
                }
                plan.families.push(ks.family_prefix(&LINK_LIST, owner)?);
            }
            ChangeEvent::Folder { owner } => {
                plan.push(ks.folder_tree(owner)?);
                plan.push(ks.folder_list(owner)?);
                plan.extend(ks.folder_dashboard_keys(owner)?);
                plan.push(ks.user_stats(owner)?);
            }
            ChangeEvent::Tag { owner } => {
                plan.push(ks.tag_list(owner)?);
                plan.push(ks.tag_counts(owner)?);
                plan.push(ks.dashboard_stats(owner)?);
                plan.push(ks.user_stats(owner)?);
            }
            ChangeEvent::User { owner } => {
                plan.push(ks.user_prefs(owner)?);
                plan.push(ks.user_stats(owner)?);
                plan.push(ks.user_profile(owner)?);
            }
            ChangeEvent::Bulk { owner } => {
                plan.extend(ks.owner_keys(owner)?);
                plan.families.push(ks.family_prefix(&LINK_LIST, owner)?);
                plan.families.push(ks.family_prefix(&LINK_DETAIL, owner)?);
            }
        }
        Ok(plan)
    }

    /// 执行事件对应的失效，返回共享层删除的键数量
    ///
    /// 非法的所有者ID在任何删除发生之前被拒绝
    #[instrument(skip(self, event), fields(event = %event))]
    pub async fn dispatch(&self, event: &ChangeEvent) -> Result<u64> {
        let plan = match self.plan(event) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("rejected invalidation {}: {}", event, e);
                return Err(e);
            }
        };
        let mut removed = self.cache.remove(&plan.keys).await;
        for prefix in &plan.families {
            removed += self.cache.remove_family(prefix).await;
        }
        debug!(
            "invalidated {}: keys={}, families={}, removed={}",
            event,
            plan.keys.len(),
            plan.families.len(),
            removed
        );
        Ok(removed)
    }

    pub async fn on_link_change(&self, owner: &str, link_id: Option<&str>) -> Result<u64> {
        self.dispatch(&ChangeEvent::Link {
            owner: owner.to_string(),
            link_id: link_id.map(str::to_string),
        })
        .await
    }

    pub async fn on_folder_change(&self, owner: &str) -> Result<u64> {
        self.dispatch(&ChangeEvent::Folder {
            owner: owner.to_string(),
        })
        .await
    }

    pub async fn on_tag_change(&self, owner: &str) -> Result<u64> {
        self.dispatch(&ChangeEvent::Tag {
            owner: owner.to_string(),
        })
        .await
    }

    pub async fn on_user_change(&self, owner: &str) -> Result<u64> {
        self.dispatch(&ChangeEvent::User {
            owner: owner.to_string(),
        })
        .await
    }

    pub async fn on_bulk_change(&self, owner: &str) -> Result<u64> {
        self.dispatch(&ChangeEvent::Bulk {
            owner: owner.to_string(),
        })
        .await
    }
}
