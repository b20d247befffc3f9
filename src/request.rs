//! Request parsing and validation
//!
//! Turns the pieces the HTTP layer extracts from a URL (resource names or a
//! view token, query parameters, resolution, ranges) into a
//! [`ResolvedRequest`]: a lookup key plus, for cutouts, a validated extent.
//!
//! ## Routes understood by [`RawRequest`]
//!
//! ```text
//! col[/exp[/chan]]                              metadata
//! col/exp/chan/res/x0:x1/y0:y1/z0:z1[/t0:t1]    cutout, full token
//! res/x0:x1/y0:y1/z0:z1[/t0:t1]?view=token      cutout, view token
//! ```
//!
//! Parsing fails fast: argument checks first, then identity, then bounds.

use std::collections::BTreeMap;
use std::future::Future;

use tracing::debug;

use crate::catalog::Catalog;
use crate::cutout::Cutout;
use crate::frame::{validate_extent, AxisRange, Extent};
use crate::kv::KvStore;
use crate::lookup::{LookupKey, LookupKeyResolver, ResourceNames, MAX_DEPTH};
use crate::{Error, Result};

/// Query parameters of a request.
pub type QueryParams = BTreeMap<String, String>;

/// Metadata key parameter
pub const KEY_PARAM: &str = "key";
/// Metadata value parameter
pub const VALUE_PARAM: &str = "value";
/// View token parameter
pub const VIEW_PARAM: &str = "view";

/// Operation requested, one per HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// GET: read one entry or list
    Get,
    /// POST: create
    Create,
    /// PUT: update
    Update,
    /// DELETE
    Delete,
}

impl Operation {
    /// Map an HTTP method (case-insensitive).
    ///
    /// # Errors
    /// [`Error::MethodNotAllowed`] for other methods.
    pub fn from_method(method: &str) -> Result<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Create),
            "PUT" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::MethodNotAllowed(other.to_string())),
        }
    }
}

/// Resolves saved view tokens to full resource names.
///
/// This is an extension point; the backing mechanism is up to the deployment.
pub trait ViewResolver: Send + Sync {
    /// Names the token stands for.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown tokens.
    fn resolve_view_token(&self, token: &str)
        -> impl Future<Output = Result<ResourceNames>> + Send;
}

/// View resolver that knows no tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViews;

impl ViewResolver for NoViews {
    async fn resolve_view_token(&self, token: &str) -> Result<ResourceNames> {
        Err(Error::NotFound(format!("view token '{token}'")))
    }
}

/// Unparsed cutout arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoutArgs {
    /// Resolution level
    pub resolution: String,
    /// x, y, z and optionally t ranges as `start:stop`
    pub ranges: Vec<String>,
}

/// Request as extracted from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    /// Requested operation
    pub operation: Operation,
    /// Resource names; empty in view-token mode
    pub names: Vec<String>,
    /// Query parameters
    pub params: QueryParams,
    /// Present for cutout requests
    pub cutout: Option<CutoutArgs>,
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

impl RawRequest {
    /// Metadata request for `col[/exp[/chan]]`.
    #[must_use]
    pub fn metadata(operation: Operation, path: &str) -> Self {
        Self {
            operation,
            names: split_path(path),
            params: QueryParams::new(),
            cutout: None,
        }
    }

    /// Cutout request from a route without its `cutout/` prefix.
    ///
    /// Four or five segments address a view token, seven or eight name the
    /// channel directly.
    ///
    /// # Errors
    /// [`Error::MalformedRange`] for any other segment count.
    pub fn cutout(operation: Operation, path: &str) -> Result<Self> {
        let mut segments = split_path(path);
        let names = match segments.len() {
            4 | 5 => Vec::new(),
            7 | 8 => segments.drain(..MAX_DEPTH).collect(),
            n => {
                return Err(Error::MalformedRange(format!(
                    "cutout route '{path}' has {n} segments"
                )))
            }
        };
        let resolution = segments.remove(0);
        Ok(Self {
            operation,
            names,
            params: QueryParams::new(),
            cutout: Some(CutoutArgs {
                resolution,
                ranges: segments,
            }),
        })
    }

    /// Add a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn non_empty_param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn require_param(&self, name: &str) -> Result<String> {
        self.non_empty_param(name)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingArgument(format!("query parameter '{name}'")))
    }
}

/// Validated metadata arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaArgs {
    /// Metadata key; `None` lists keys
    pub key: Option<String>,
    /// Value for create/update
    pub value: Option<String>,
}

/// What a resolved request addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Metadata under the lookup key
    Metadata(MetaArgs),
    /// A validated cutout
    Cutout(Cutout),
}

/// Output of [`RequestParser::parse`]. Carries identities, never entity rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    /// Requested operation
    pub operation: Operation,
    /// Resolved identity
    pub lookup_key: LookupKey,
    /// Addressed resource
    pub target: Target,
}

/// Parser combining identity resolution and extent validation.
#[derive(Debug)]
pub struct RequestParser<S: KvStore, C: Catalog, V: ViewResolver> {
    resolver: LookupKeyResolver<S>,
    catalog: C,
    views: V,
    max_cutout_bytes: u64,
}

impl<S: KvStore, C: Catalog, V: ViewResolver> RequestParser<S, C, V> {
    /// Create a parser. Cutouts larger than `max_cutout_bytes` once
    /// decompressed are rejected.
    #[must_use]
    pub const fn new(
        resolver: LookupKeyResolver<S>,
        catalog: C,
        views: V,
        max_cutout_bytes: u64,
    ) -> Self {
        Self {
            resolver,
            catalog,
            views,
            max_cutout_bytes,
        }
    }

    /// The lookup key resolver.
    #[must_use]
    pub const fn resolver(&self) -> &LookupKeyResolver<S> {
        &self.resolver
    }

    /// The relational store.
    #[must_use]
    pub const fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Parse and validate a request.
    ///
    /// # Errors
    /// - [`Error::MissingArgument`] for absent metadata parameters
    /// - [`Error::MalformedRange`] for unparsable resolution or ranges
    /// - [`Error::NotFound`] for unknown names or view tokens
    /// - [`Error::OutOfBounds`] for ranges outside the frame
    pub async fn parse(&self, request: &RawRequest) -> Result<ResolvedRequest> {
        match &request.cutout {
            None => self.parse_metadata(request).await,
            Some(args) => self.parse_cutout(request, args).await,
        }
    }

    async fn names(&self, request: &RawRequest) -> Result<ResourceNames> {
        if !request.names.is_empty() {
            return ResourceNames::from_segments(&request.names);
        }
        let token = request
            .non_empty_param(VIEW_PARAM)
            .ok_or_else(|| Error::NotFound("request names no resource and no view token".to_string()))?;
        self.views.resolve_view_token(token).await
    }

    async fn parse_metadata(&self, request: &RawRequest) -> Result<ResolvedRequest> {
        let args = match request.operation {
            // Absent key lists; a present key must name something
            Operation::Get => MetaArgs {
                key: match request.params.get(KEY_PARAM) {
                    Some(_) => Some(request.require_param(KEY_PARAM)?),
                    None => None,
                },
                value: None,
            },
            Operation::Create | Operation::Update => MetaArgs {
                key: Some(request.require_param(KEY_PARAM)?),
                value: Some(request.require_param(VALUE_PARAM)?),
            },
            Operation::Delete => MetaArgs {
                key: Some(request.require_param(KEY_PARAM)?),
                value: None,
            },
        };

        let names = self.names(request).await?;
        let lookup_key = self.resolver.resolve(&names).await?;
        Ok(ResolvedRequest {
            operation: request.operation,
            lookup_key,
            target: Target::Metadata(args),
        })
    }

    async fn parse_cutout(&self, request: &RawRequest, args: &CutoutArgs) -> Result<ResolvedRequest> {
        let resolution: u8 = args.resolution.parse().map_err(|_| {
            Error::MalformedRange(format!("resolution '{}' is not a level", args.resolution))
        })?;
        let extent = parse_extent(&args.ranges)?;

        let names = self.names(request).await?;
        let lookup_key = self.resolver.resolve(&names).await?;
        // Rows come from the key's ids; the request names may be stale after a rename
        let &[_, experiment_id, channel_id] = lookup_key.ids() else {
            return Err(Error::NotFound(format!(
                "cutouts address a channel or layer, got '{}'",
                names.boss_key()
            )));
        };

        let missing = |what: &str| Error::NotFound(format!("{what} of '{}'", names.boss_key()));
        let experiment_row = self
            .catalog
            .experiment_by_id(experiment_id)?
            .ok_or_else(|| missing("experiment"))?;
        let channel_row = self
            .catalog
            .channel_layer_by_id(channel_id)?
            .ok_or_else(|| missing("channel/layer"))?;
        let frame = self
            .catalog
            .coordinate_frame(&experiment_row.coord_frame)?
            .ok_or_else(|| missing("coordinate frame"))?;

        if resolution >= experiment_row.num_hierarchy_levels {
            return Err(Error::OutOfBounds(format!(
                "resolution {resolution} beyond the {} levels of '{}'",
                experiment_row.num_hierarchy_levels,
                names.boss_key()
            )));
        }
        validate_extent(&frame, resolution, &extent, experiment_row.max_time_sample)?;

        let cutout = Cutout::new(lookup_key.clone(), resolution, extent, channel_row.datatype);
        match cutout.byte_len() {
            Some(bytes) if bytes <= self.max_cutout_bytes => {}
            _ => {
                return Err(Error::OutOfBounds(format!(
                    "cutout {extent} exceeds the {} byte limit",
                    self.max_cutout_bytes
                )))
            }
        }

        debug!(lookup_key = %lookup_key, resolution, extent = %extent, "cutout request resolved");
        Ok(ResolvedRequest {
            operation: request.operation,
            lookup_key,
            target: Target::Cutout(cutout),
        })
    }
}

/// Parse three (x, y, z) or four (x, y, z, t) `start:stop` ranges.
///
/// # Errors
/// [`Error::MalformedRange`] for a wrong count or unparsable range.
pub fn parse_extent<S: AsRef<str>>(ranges: &[S]) -> Result<Extent> {
    let parsed = ranges
        .iter()
        .map(|r| r.as_ref().parse::<AxisRange>())
        .collect::<Result<Vec<_>>>()?;
    match parsed.as_slice() {
        [x, y, z] => Ok(Extent::new(*x, *y, *z)),
        [x, y, z, t] => Ok(Extent::new(*x, *y, *z).with_time(*t)),
        _ => Err(Error::MalformedRange(format!(
            "expected 3 or 4 ranges, got {}",
            ranges.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogWriter, MemoryCatalog, NewChannelLayer, NewExperiment};
    use crate::frame::CoordinateFrame;
    use crate::kv::MemoryKvStore;
    use crate::lookup::Registration;
    use crate::ErrorKind;
    use std::sync::Arc;

    type Parser = RequestParser<Arc<MemoryKvStore>, Arc<MemoryCatalog>, NoViews>;

    async fn parser() -> (Parser, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let resolver = LookupKeyResolver::new(Arc::clone(&store));

        catalog
            .create_coordinate_frame(
                CoordinateFrame::builder("cf1")
                    .x(0, 1000)
                    .y(0, 1000)
                    .z(0, 1000)
                    .voxel_size(4.0, 4.0, 4.0)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let col = catalog.create_collection("col1", "").unwrap();
        let exp = catalog
            .create_experiment("col1", NewExperiment::new("exp1", "cf1").num_hierarchy_levels(4))
            .unwrap();
        let chan = catalog
            .create_channel_layer("col1", "exp1", NewChannelLayer::channel("channel1"))
            .unwrap();

        let col_key = resolver
            .register(Registration::collection(col.id, "col1"))
            .await
            .unwrap();
        let exp_key = resolver
            .register(Registration::child(col_key, exp.id, "exp1"))
            .await
            .unwrap();
        resolver
            .register(Registration::child(exp_key, chan.id, "channel1"))
            .await
            .unwrap();

        (
            RequestParser::new(resolver, catalog, NoViews, 1024 * 1024),
            store,
        )
    }

    #[test]
    fn test_operation_from_method() {
        assert_eq!(Operation::from_method("get").unwrap(), Operation::Get);
        assert_eq!(Operation::from_method("POST").unwrap(), Operation::Create);
        assert_eq!(Operation::from_method("PUT").unwrap(), Operation::Update);
        assert_eq!(Operation::from_method("DELETE").unwrap(), Operation::Delete);
        assert_eq!(
            Operation::from_method("PATCH").unwrap_err().kind(),
            ErrorKind::MethodNotAllowed
        );
    }

    #[test]
    fn test_cutout_route_shapes() {
        let full = RawRequest::cutout(Operation::Get, "col1/exp1/channel1/2/0:5/0:6/0:2").unwrap();
        assert_eq!(full.names, vec!["col1", "exp1", "channel1"]);
        let args = full.cutout.unwrap();
        assert_eq!(args.resolution, "2");
        assert_eq!(args.ranges, vec!["0:5", "0:6", "0:2"]);

        let view = RawRequest::cutout(Operation::Get, "/2/0:5/0:6/0:2/0:1/").unwrap();
        assert!(view.names.is_empty());
        assert_eq!(view.cutout.unwrap().ranges.len(), 4);

        let err = RawRequest::cutout(Operation::Get, "col1/exp1/2/0:5/0:6/0:2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRange);
    }

    #[tokio::test]
    async fn test_five_segment_route_is_a_view_with_time() {
        // Five segments read as resolution plus four ranges, so a lone
        // collection name lands in the resolution slot
        let (parser, _) = parser().await;
        let request = RawRequest::cutout(Operation::Get, "col1/2/0:5/0:6/0:2").unwrap();
        assert!(request.names.is_empty());

        let err = parser.parse(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRange);
    }

    #[test]
    fn test_parse_extent() {
        let e = parse_extent(&["0:5", "0:6", "0:2"]).unwrap();
        assert_eq!(e.t, AxisRange::new(0, 1));
        let e = parse_extent(&["0:5", "0:6", "0:2", "3:4"]).unwrap();
        assert_eq!(e.t, AxisRange::new(3, 4));
        assert!(parse_extent(&["0:5", "0:6"]).is_err());
        assert!(parse_extent(&["0:5", "0:6", "x"]).is_err());
    }

    #[tokio::test]
    async fn test_full_token_cutout_resolves() {
        let (parser, _) = parser().await;
        let request =
            RawRequest::cutout(Operation::Get, "col1/exp1/channel1/2/0:5/0:6/0:2").unwrap();

        let resolved = parser.parse(&request).await.unwrap();

        assert_eq!(resolved.lookup_key.to_string(), "1&2&3");
        let Target::Cutout(cutout) = resolved.target else {
            panic!("expected cutout target");
        };
        assert_eq!(cutout.resolution, 2);
        assert_eq!(cutout.extent.x, AxisRange::new(0, 5));
    }

    #[tokio::test]
    async fn test_cutout_after_rename_uses_rows_by_id() {
        let (parser, _) = parser().await;
        let exp_key: LookupKey = "1&2".parse().unwrap();
        parser.resolver().rename(&exp_key, "renamed").await.unwrap();

        let request =
            RawRequest::cutout(Operation::Get, "col1/renamed/channel1/2/0:5/0:6/0:2").unwrap();
        let resolved = parser.parse(&request).await.unwrap();

        assert_eq!(resolved.lookup_key.to_string(), "1&2&3");
        assert!(parser.catalog().experiment("col1", "renamed").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_view_token_cutout_not_found() {
        let (parser, _) = parser().await;
        let request = RawRequest::cutout(Operation::Get, "2/0:5/0:6/0:2")
            .unwrap()
            .param(VIEW_PARAM, "token1");

        let err = parser.parse(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_missing_view_token_not_found() {
        let (parser, _) = parser().await;
        let request = RawRequest::cutout(Operation::Get, "2/0:5/0:6/0:2").unwrap();

        let err = parser.parse(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cutout_errors() {
        let (parser, _) = parser().await;
        let cases = [
            ("col1/exp1/channel1/x/0:5/0:6/0:2", ErrorKind::MalformedRange),
            ("col1/exp1/channel1/2/5:0/0:6/0:2", ErrorKind::MalformedRange),
            ("col1/exp1/channel1/2/0:251/0:6/0:2", ErrorKind::OutOfBounds),
            ("col1/exp1/channel1/4/0:5/0:6/0:2", ErrorKind::OutOfBounds),
            ("col1/exp1/channel1/0/0:5/0:6/0:2/1:2", ErrorKind::OutOfBounds),
            ("col1/exp1/nope/2/0:5/0:6/0:2", ErrorKind::NotFound),
            ("col1/exp1/channel1/0/0:1000/0:1000/0:10", ErrorKind::OutOfBounds),
        ];
        for (path, kind) in cases {
            let request = RawRequest::cutout(Operation::Get, path).unwrap();
            let err = parser.parse(&request).await.unwrap_err();
            assert_eq!(err.kind(), kind, "path {path}: {err}");
        }
    }

    #[tokio::test]
    async fn test_metadata_missing_value_touches_nothing() {
        let (parser, store) = parser().await;
        let entries = store.len();
        let request = RawRequest::metadata(Operation::Create, "col1").param(KEY_PARAM, "a");

        let err = parser.parse(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingArgument);
        assert_eq!(store.len(), entries);
    }

    #[tokio::test]
    async fn test_metadata_argument_rules() {
        let (parser, _) = parser().await;

        let list = RawRequest::metadata(Operation::Get, "col1/exp1");
        let resolved = parser.parse(&list).await.unwrap();
        assert_eq!(
            resolved.target,
            Target::Metadata(MetaArgs {
                key: None,
                value: None
            })
        );

        let delete = RawRequest::metadata(Operation::Delete, "col1");
        assert_eq!(
            parser.parse(&delete).await.unwrap_err().kind(),
            ErrorKind::MissingArgument
        );

        let empty_key = RawRequest::metadata(Operation::Update, "col1")
            .param(KEY_PARAM, "")
            .param(VALUE_PARAM, "v");
        assert_eq!(
            parser.parse(&empty_key).await.unwrap_err().kind(),
            ErrorKind::MissingArgument
        );

        let present_but_empty = RawRequest::metadata(Operation::Get, "col1").param(KEY_PARAM, "");
        assert_eq!(
            parser.parse(&present_but_empty).await.unwrap_err().kind(),
            ErrorKind::MissingArgument
        );

        // Argument errors win over identity errors
        let unknown = RawRequest::metadata(Operation::Create, "nope").param(KEY_PARAM, "a");
        assert_eq!(
            parser.parse(&unknown).await.unwrap_err().kind(),
            ErrorKind::MissingArgument
        );
    }

    #[tokio::test]
    async fn test_metadata_unknown_resource() {
        let (parser, _) = parser().await;
        let request = RawRequest::metadata(Operation::Get, "col1/exp2");
        assert_eq!(
            parser.parse(&request).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(parser.catalog().collection("col1").unwrap().is_some());
    }
}
