//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存键模板注册表和各业务域的TTL。
//!
//! 线上键格式为 `namespace:domain:ownerId[:extraDimension...]`，全部为 ASCII。

use crate::error::{CacheError, Result};
use std::fmt;

/// 业务域
///
/// 每个键模板归属于一个业务域，失效路由按业务域分组取键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// 仪表盘聚合（最易变）
    Dashboard,
    /// 单个实体详情
    Entity,
    /// 按所有者分页的列表视图
    Listing,
    /// 文件夹树/列表
    Folder,
    /// 标签列表/计数
    Tag,
    /// 用户偏好/统计/资料
    User,
}

/// 缓存键模板
///
/// `pattern` 中 `{owner}` 为所有者槽位，其余 `{...}` 按顺序由额外参数填充
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTemplate {
    /// 模板名称
    pub name: &'static str,
    /// 所属业务域
    pub domain: Domain,
    /// 键模式（不含命名空间）
    pub pattern: &'static str,
    /// 业务域TTL（秒）
    pub ttl: u64,
}

impl KeyTemplate {
    /// 除所有者之外的参数槽位数量
    pub fn extra_slots(&self) -> usize {
        self.pattern
            .split(':')
            .filter(|seg| is_slot(seg) && *seg != OWNER_SLOT)
            .count()
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, ttl={}s)", self.name, self.pattern, self.ttl)
    }
}

const OWNER_SLOT: &str = "{owner}";

fn is_slot(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}

pub const DASH_HOME: KeyTemplate = KeyTemplate {
    name: "dash_home",
    domain: Domain::Dashboard,
    pattern: "dash:{owner}:home",
    ttl: 60,
};

pub const DASH_STATS: KeyTemplate = KeyTemplate {
    name: "dash_stats",
    domain: Domain::Dashboard,
    pattern: "dash:{owner}:stats",
    ttl: 120,
};

pub const DASH_QUICK: KeyTemplate = KeyTemplate {
    name: "dash_quick",
    domain: Domain::Dashboard,
    pattern: "dash:{owner}:quick",
    ttl: 60,
};

pub const DASH_OVERVIEW: KeyTemplate = KeyTemplate {
    name: "dash_overview",
    domain: Domain::Dashboard,
    pattern: "dash:{owner}:overview",
    ttl: 120,
};

pub const DASH_RECENT: KeyTemplate = KeyTemplate {
    name: "dash_recent",
    domain: Domain::Dashboard,
    pattern: "dash:{owner}:recent",
    ttl: 60,
};

pub const DASH_POPULAR: KeyTemplate = KeyTemplate {
    name: "dash_popular",
    domain: Domain::Dashboard,
    pattern: "dash:{owner}:popular",
    ttl: 120,
};

pub const LINK_DETAIL: KeyTemplate = KeyTemplate {
    name: "link_detail",
    domain: Domain::Entity,
    pattern: "link:{owner}:{link}",
    ttl: 300,
};

pub const LINK_LIST: KeyTemplate = KeyTemplate {
    name: "link_list",
    domain: Domain::Listing,
    pattern: "links:{owner}:{view}:{sort}:{cursor}",
    ttl: 120,
};

pub const FOLDER_TREE: KeyTemplate = KeyTemplate {
    name: "folder_tree",
    domain: Domain::Folder,
    pattern: "folders:{owner}:tree",
    ttl: 300,
};

pub const FOLDER_LIST: KeyTemplate = KeyTemplate {
    name: "folder_list",
    domain: Domain::Folder,
    pattern: "folders:{owner}:list",
    ttl: 300,
};

pub const TAG_LIST: KeyTemplate = KeyTemplate {
    name: "tag_list",
    domain: Domain::Tag,
    pattern: "tags:{owner}:list",
    ttl: 300,
};

pub const TAG_COUNTS: KeyTemplate = KeyTemplate {
    name: "tag_counts",
    domain: Domain::Tag,
    pattern: "tagcounts:{owner}",
    ttl: 300,
};

pub const USER_PREFS: KeyTemplate = KeyTemplate {
    name: "user_prefs",
    domain: Domain::User,
    pattern: "uprefs:{owner}",
    ttl: 600,
};

pub const USER_STATS: KeyTemplate = KeyTemplate {
    name: "user_stats",
    domain: Domain::User,
    pattern: "ustats:{owner}",
    ttl: 300,
};

pub const USER_PROFILE: KeyTemplate = KeyTemplate {
    name: "user_profile",
    domain: Domain::User,
    pattern: "uprofile:{owner}",
    ttl: 600,
};

/// 全部已注册的键模板
pub const TEMPLATES: &[KeyTemplate] = &[
    DASH_HOME,
    DASH_STATS,
    DASH_QUICK,
    DASH_OVERVIEW,
    DASH_RECENT,
    DASH_POPULAR,
    LINK_DETAIL,
    LINK_LIST,
    FOLDER_TREE,
    FOLDER_LIST,
    TAG_LIST,
    TAG_COUNTS,
    USER_PREFS,
    USER_STATS,
    USER_PROFILE,
];

/// 由文件夹内容派生的仪表盘视图
pub const FOLDER_DERIVED_DASHBOARD: &[KeyTemplate] =
    &[DASH_HOME, DASH_STATS, DASH_QUICK, DASH_OVERVIEW];

/// 缓存键空间
///
/// 在模板前加上命名空间并填充所有者与额外参数。
/// 所有分组访问器都是纯函数，不做任何 I/O。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    /// 创建键空间
    ///
    /// # 参数
    ///
    /// * `namespace` - 所有键的第一个段，例如 `bm`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 所有已注册模板中最短的业务域TTL（秒）
    pub fn min_ttl() -> u64 {
        TEMPLATES.iter().map(|t| t.ttl).min().unwrap_or(0)
    }

    /// 渲染完整的缓存键
    ///
    /// # 参数
    ///
    /// * `template` - 键模板
    /// * `owner` - 所有者ID
    /// * `params` - 额外维度，按模板中出现的顺序
    ///
    /// # 返回值
    ///
    /// 返回带命名空间的缓存键；所有者或参数不是合法键段时返回 `InvalidKey`
    pub fn render(
        &self,
        template: &KeyTemplate,
        owner: &str,
        params: &[&str],
    ) -> Result<String> {
        if template.extra_slots() != params.len() {
            return Err(CacheError::InvalidKey {
                segment: template.name.to_string(),
                reason: format!(
                    "template expects {} parameters, got {}",
                    template.extra_slots(),
                    params.len()
                ),
            });
        }
        validate_segment(owner)?;
        for param in params {
            validate_segment(param)?;
        }

        let mut key = self.namespace.clone();
        let mut params = params.iter();
        for segment in template.pattern.split(':') {
            key.push(':');
            if segment == OWNER_SLOT {
                key.push_str(owner);
            } else if is_slot(segment) {
                key.push_str(params.next().copied().unwrap_or_default());
            } else {
                key.push_str(segment);
            }
        }
        Ok(key)
    }

    /// 渲染模板在第一个额外参数之前的前缀（包含结尾的 `:`）
    ///
    /// 用于按族批量失效无法枚举的键，例如某个用户的所有列表分页
    pub fn family_prefix(&self, template: &KeyTemplate, owner: &str) -> Result<String> {
        validate_segment(owner)?;
        let mut prefix = self.namespace.clone();
        for segment in template.pattern.split(':') {
            prefix.push(':');
            if segment == OWNER_SLOT {
                prefix.push_str(owner);
            } else if is_slot(segment) {
                return Ok(prefix);
            } else {
                prefix.push_str(segment);
            }
        }
        prefix.push(':');
        Ok(prefix)
    }

    fn owner_key(&self, template: &KeyTemplate, owner: &str) -> Result<String> {
        self.render(template, owner, &[])
    }

    fn keys_for(&self, templates: &[KeyTemplate], owner: &str) -> Result<Vec<String>> {
        templates
            .iter()
            .filter(|t| t.extra_slots() == 0)
            .map(|t| self.owner_key(t, owner))
            .collect()
    }

    pub fn dashboard_home(&self, owner: &str) -> Result<String> {
        self.owner_key(&DASH_HOME, owner)
    }

    pub fn dashboard_stats(&self, owner: &str) -> Result<String> {
        self.owner_key(&DASH_STATS, owner)
    }

    pub fn link_detail(&self, owner: &str, link_id: &str) -> Result<String> {
        self.render(&LINK_DETAIL, owner, &[link_id])
    }

    /// 列表视图键：视图 + 排序 + 游标
    pub fn link_list(
        &self,
        owner: &str,
        view: &str,
        sort: &str,
        cursor: &str,
    ) -> Result<String> {
        self.render(&LINK_LIST, owner, &[view, sort, cursor])
    }

    pub fn folder_tree(&self, owner: &str) -> Result<String> {
        self.owner_key(&FOLDER_TREE, owner)
    }

    pub fn folder_list(&self, owner: &str) -> Result<String> {
        self.owner_key(&FOLDER_LIST, owner)
    }

    pub fn tag_list(&self, owner: &str) -> Result<String> {
        self.owner_key(&TAG_LIST, owner)
    }

    pub fn tag_counts(&self, owner: &str) -> Result<String> {
        self.owner_key(&TAG_COUNTS, owner)
    }

    pub fn user_prefs(&self, owner: &str) -> Result<String> {
        self.owner_key(&USER_PREFS, owner)
    }

    pub fn user_stats(&self, owner: &str) -> Result<String> {
        self.owner_key(&USER_STATS, owner)
    }

    pub fn user_profile(&self, owner: &str) -> Result<String> {
        self.owner_key(&USER_PROFILE, owner)
    }

    /// 某业务域下该所有者的全部可枚举键
    pub fn domain_keys(&self, domain: Domain, owner: &str) -> Result<Vec<String>> {
        TEMPLATES
            .iter()
            .filter(|t| t.domain == domain && t.extra_slots() == 0)
            .map(|t| self.owner_key(t, owner))
            .collect()
    }

    /// 该所有者的全部仪表盘键
    pub fn dashboard_keys(&self, owner: &str) -> Result<Vec<String>> {
        self.domain_keys(Domain::Dashboard, owner)
    }

    /// 由文件夹内容派生的仪表盘键（home/stats/quick/overview）
    pub fn folder_dashboard_keys(&self, owner: &str) -> Result<Vec<String>> {
        self.keys_for(FOLDER_DERIVED_DASHBOARD, owner)
    }

    /// 该所有者在所有业务域中的全部可枚举键
    pub fn owner_keys(&self, owner: &str) -> Result<Vec<String>> {
        self.keys_for(TEMPLATES, owner)
    }

    /// 该所有者所有不可枚举键族的前缀
    pub fn owner_families(&self, owner: &str) -> Result<Vec<String>> {
        TEMPLATES
            .iter()
            .filter(|t| t.extra_slots() > 0)
            .map(|t| self.family_prefix(t, owner))
            .collect()
    }
}

/// 检查所有者ID或额外参数能否作为单个键段
///
/// 键段必须非空，只含可见 ASCII 字符且不含分隔符 `:`。
/// 否则一个所有者的键可能落进另一个所有者的键族前缀。
pub fn validate_segment(segment: &str) -> Result<()> {
    let reason = if segment.is_empty() {
        "segment cannot be empty"
    } else if segment.contains(':') {
        "segment cannot contain ':'"
    } else if !segment.bytes().all(|b| b.is_ascii_graphic()) {
        "segment must be printable ASCII without whitespace"
    } else {
        return Ok(());
    };
    Err(CacheError::InvalidKey {
        segment: segment.to_string(),
        reason: reason.to_string(),
    })
}
