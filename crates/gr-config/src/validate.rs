use crate::replay::ReplayConfig;
use crate::service::ServiceConfig;

/// Called from `ServiceConfig::from_str` / `load`.
pub(crate) fn validate_service(config: &ServiceConfig) -> anyhow::Result<()> {
    if config.catalog.schemas.trim().is_empty() {
        anyhow::bail!("catalog.schemas must be a non-empty glob");
    }
    if config.catalog.datasets.trim().is_empty() {
        anyhow::bail!("catalog.datasets must be a non-empty glob");
    }
    if !config.catalog.epoch_offset.is_finite() {
        anyhow::bail!("catalog.epoch_offset must be finite");
    }
    if config.replay.publish_limit == 0 {
        anyhow::bail!("replay.publish_limit must be > 0");
    }
    Ok(())
}

/// Called from `ReplayConfig::from_str` / `load` / `validate`.
pub(crate) fn validate_replay(config: &ReplayConfig) -> anyhow::Result<()> {
    let q = &config.query;
    if q.publish_limit == 0 {
        anyhow::bail!("query.publish_limit must be > 0");
    }
    if let Some(stride) = q.stride_time
        && !(stride > 0.0 && stride.is_finite())
    {
        anyhow::bail!("query.stride_time must be a positive number, got {stride}");
    }
    if let (Some(start), Some(end)) = (q.start_time, q.end_time)
        && start > end
    {
        anyhow::bail!("query.start_time ({start}) must not be after query.end_time ({end})");
    }
    if let Some(range) = &q.explicit_index_range
        && range.stride == Some(0)
    {
        anyhow::bail!("query.explicit_index_range.stride must be > 0");
    }
    if q.exact_stride && q.stride_time.is_none() {
        anyhow::bail!("query.exact_stride requires query.stride_time");
    }
    if let Some(uri) = &config.output_destination {
        crate::output::parse_output_uri(uri)?;
    }
    Ok(())
}
