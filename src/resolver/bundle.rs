//! Bundle resolver parameters
//!
//! `bundle` (or `image`) and `name` are required, `kind` defaults to `task`.
//! A `serviceAccount` is synthesized when absent; it has no bearing on
//! static validation but the fetch contract carries one.

use super::fetch::BundleRequest;
use super::{ResolveContext, ResolveError};
use crate::model::param::{string_value, Param};
use crate::refs;

pub fn request(
    params: &[Param],
    ctx: &ResolveContext<'_>,
    default_service_account: &str,
) -> Result<BundleRequest, ResolveError> {
    let value = |name: &str| -> Result<Option<String>, ResolveError> {
        let Some(raw) = string_value(params, name).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        let substituted = ctx.substitute(raw);
        if refs::contains_param_ref(&substituted) {
            return Err(ResolveError::Unresolved {
                resolver: "bundles",
                name: name.to_string(),
                value: substituted,
            });
        }
        Ok(Some(substituted))
    };

    let bundle = match value("bundle")? {
        Some(b) => b,
        None => value("image")?.ok_or_else(|| ResolveError::BundleParam("bundle".to_string()))?,
    };
    let name = value("name")?.ok_or_else(|| ResolveError::BundleParam("name".to_string()))?;

    Ok(BundleRequest {
        bundle,
        name,
        kind: value("kind")?.unwrap_or_else(|| "task".to_string()),
        service_account: value("serviceAccount")?
            .unwrap_or_else(|| default_service_account.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_defaults_are_synthesized() {
        let runtime = BTreeMap::new();
        let ctx = ResolveContext::new(&[], &runtime);
        let params = vec![
            Param::string("bundle", "quay.io/org/catalog:v1"),
            Param::string("name", "buildah"),
        ];

        let req = request(&params, &ctx, "none").unwrap();
        assert_eq!(req.kind, "task");
        assert_eq!(req.service_account, "none");
        assert_eq!(req.bundle, "quay.io/org/catalog:v1");
    }

    #[test]
    fn test_image_alias_and_missing_name() {
        let runtime = BTreeMap::new();
        let ctx = ResolveContext::new(&[], &runtime);

        let params = vec![Param::string("image", "quay.io/org/catalog:v1")];
        let err = request(&params, &ctx, "none").unwrap_err();
        assert_eq!(err.to_string(), "bundle resolver requires parameter \"name\"");

        let err = request(&[], &ctx, "none").unwrap_err();
        assert_eq!(err.to_string(), "bundle resolver requires parameter \"bundle\"");
    }
}
