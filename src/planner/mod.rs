//! Channel → group → chart layout planning and Y-axis alignment.

pub mod axes;
pub mod grouping;

pub use axes::{
    MaxAxesStore, PRIMARY_SCALE, SECONDARY_SCALE, axis_count, distinct_units, scale_key_for,
};
pub use grouping::{
    COMPUTED_DEFAULT_GROUP, ChartPlan, DIGITAL_DEFAULT_GROUP, GroupBucket, LayoutPlan,
    bucket_by_group, effective_groups, fill_auto_groups, plan_layout, plan_units,
};
