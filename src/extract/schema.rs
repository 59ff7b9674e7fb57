//! Per-variant canonical schemas.
//!
//! Each schema is an ordered list of `(field, rule)` pairs. The order only
//! matters for readability; records are stored in sorted maps.

use crate::types::ResourceKind;

/// How the value of one canonical field is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Copy the named key from the parser metadata block.
    Meta(&'static str),
    /// Copy the raw attribute of the same name, or null.
    Raw,
    /// The module version computed from the `source` string.
    Version,
    /// If the attribute is a reference object, its referenced name.
    ReferenceName,
    /// Integers become their decimal string; other values pass through.
    StringifyInt,
}

/// One canonical field and its extraction rule.
pub type FieldRule = (&'static str, Rule);

const TF_META: [FieldRule; 5] = [
    ("tf_label", Rule::Meta("label")),
    ("tf_filename", Rule::Meta("filename")),
    ("tf_path", Rule::Meta("path")),
    ("tf_line_start", Rule::Meta("line_start")),
    ("tf_line_end", Rule::Meta("line_end")),
];

const HMPPS_TEMPLATE: &[FieldRule] = &[
    TF_META[0],
    TF_META[1],
    TF_META[2],
    TF_META[3],
    TF_META[4],
    ("tf_mod_version", Rule::Version),
    ("application", Rule::Raw),
    ("application_insights_instance", Rule::Raw),
    ("environment_name", Rule::Raw),
    ("github_repo", Rule::Raw),
    ("github_team_name", Rule::Raw),
    ("namespace", Rule::Raw),
    ("reviewer_teams", Rule::Raw),
    ("selected_branch_patterns", Rule::Raw),
    ("source_template_repo", Rule::Raw),
    ("protected_branches_only", Rule::Raw),
    ("is_production", Rule::Raw),
    ("prevent_self_review", Rule::Raw),
];

const RDS_INSTANCE: &[FieldRule] = &[
    TF_META[0],
    TF_META[1],
    TF_META[2],
    TF_META[3],
    TF_META[4],
    ("tf_mod_version", Rule::Version),
    ("db_instance_class", Rule::Raw),
    ("db_engine_version", Rule::Raw),
    ("rds_family", Rule::Raw),
    ("is_production", Rule::Raw),
    ("namespace", Rule::Raw),
    ("environment_name", Rule::Raw),
    ("application", Rule::Raw),
    ("db_max_allocated_storage", Rule::StringifyInt),
    ("infrastructure_support", Rule::Raw),
    ("business_unit", Rule::Raw),
    ("team_name", Rule::Raw),
    ("performance_insights_enabled", Rule::Raw),
    ("allow_major_version_upgrade", Rule::Raw),
    ("allow_minor_version_upgrade", Rule::Raw),
    ("deletion_protection", Rule::Raw),
    ("maintenance_window", Rule::Raw),
    ("backup_window", Rule::Raw),
    ("db_parameter", Rule::Raw),
];

const ELASTICACHE_CLUSTER: &[FieldRule] = &[
    TF_META[0],
    TF_META[1],
    TF_META[2],
    TF_META[3],
    TF_META[4],
    ("tf_mod_version", Rule::Version),
    ("application", Rule::Raw),
    ("business_unit", Rule::Raw),
    ("engine_version", Rule::Raw),
    ("environment_name", Rule::Raw),
    ("infrastructure_support", Rule::Raw),
    ("is_production", Rule::Raw),
    ("namespace", Rule::Raw),
    ("node_type", Rule::Raw),
    ("number_cache_clusters", Rule::Raw),
    ("parameter_group_name", Rule::ReferenceName),
    ("team_name", Rule::Raw),
];

const PINGDOM_CHECK: &[FieldRule] = &[
    TF_META[0],
    TF_META[1],
    TF_META[2],
    TF_META[3],
    TF_META[4],
    ("type", Rule::Raw),
    ("name", Rule::Raw),
    ("host", Rule::Raw),
    ("url", Rule::Raw),
    ("probefilters", Rule::Raw),
    ("encryption", Rule::Raw),
    ("resolution", Rule::Raw),
    ("notifywhenbackup", Rule::Raw),
    ("sendnotificationwhendown", Rule::Raw),
    ("notifyagainevery", Rule::Raw),
    ("port", Rule::Raw),
    ("integrationids", Rule::Raw),
];

/// The schema for a resource kind.
#[must_use]
pub const fn schema(kind: ResourceKind) -> &'static [FieldRule] {
    match kind {
        ResourceKind::HmppsTemplate => HMPPS_TEMPLATE,
        ResourceKind::RdsInstance => RDS_INSTANCE,
        ResourceKind::ElasticacheCluster => ELASTICACHE_CLUSTER,
        ResourceKind::PingdomCheck => PINGDOM_CHECK,
    }
}
