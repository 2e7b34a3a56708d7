//! Catalogue of RPC products the provider can talk to

use std::fmt;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ECS_TIMEOUT: Duration = Duration::from_secs(60);

/// What to do when neither an explicit endpoint nor a domain is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPolicy {
    /// Fail, the endpoint must be configured
    Required,
    /// Ask the location service
    Discover,
    /// Ask the location service, fall back to a central endpoint.
    /// `{region}` in the template is replaced by the region id.
    Fallback(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCode {
    Ecs,
    Vpc,
    Slb,
    Dds,
    Ess,
    Kms,
    Rds,
    Ram,
    PolarDb,
    Gpdb,
    Elasticsearch,
    Hbase,
    Adb,
    RKvStore,
    Ons,
    Alidns,
    Edas,
    Cr,
    CrEe,
    Cms,
    MaxCompute,
    BssOpenApi,
    Cdn,
    SlsPop,
    Location,
    Ascm,
    Ros,
    DmsEnterprise,
    Quickbi,
    Odps,
}

impl ServiceCode {
    pub const ALL: &'static [ServiceCode] = &[
        ServiceCode::Ecs,
        ServiceCode::Vpc,
        ServiceCode::Slb,
        ServiceCode::Dds,
        ServiceCode::Ess,
        ServiceCode::Kms,
        ServiceCode::Rds,
        ServiceCode::Ram,
        ServiceCode::PolarDb,
        ServiceCode::Gpdb,
        ServiceCode::Elasticsearch,
        ServiceCode::Hbase,
        ServiceCode::Adb,
        ServiceCode::RKvStore,
        ServiceCode::Ons,
        ServiceCode::Alidns,
        ServiceCode::Edas,
        ServiceCode::Cr,
        ServiceCode::CrEe,
        ServiceCode::Cms,
        ServiceCode::MaxCompute,
        ServiceCode::BssOpenApi,
        ServiceCode::Cdn,
        ServiceCode::SlsPop,
        ServiceCode::Location,
        ServiceCode::Ascm,
        ServiceCode::Ros,
        ServiceCode::DmsEnterprise,
        ServiceCode::Quickbi,
        ServiceCode::Odps,
    ];

    /// Product code: the `endpoints` key and the `Product` parameter
    pub fn product(&self) -> &'static str {
        match self {
            ServiceCode::Ecs => "ecs",
            ServiceCode::Vpc => "vpc",
            ServiceCode::Slb => "slb",
            ServiceCode::Dds => "dds",
            ServiceCode::Ess => "ess",
            ServiceCode::Kms => "kms",
            ServiceCode::Rds => "rds",
            ServiceCode::Ram => "ram",
            ServiceCode::PolarDb => "polardb",
            ServiceCode::Gpdb => "gpdb",
            ServiceCode::Elasticsearch => "elasticsearch",
            ServiceCode::Hbase => "hbase",
            ServiceCode::Adb => "adb",
            ServiceCode::RKvStore => "r-kvstore",
            ServiceCode::Ons => "ons",
            ServiceCode::Alidns => "alidns",
            ServiceCode::Edas => "edas",
            ServiceCode::Cr => "cr",
            ServiceCode::CrEe => "cr-ee",
            ServiceCode::Cms => "cms",
            ServiceCode::MaxCompute => "maxcompute",
            ServiceCode::BssOpenApi => "bssopenapi",
            ServiceCode::Cdn => "cdn",
            ServiceCode::SlsPop => "sls",
            ServiceCode::Location => "location",
            ServiceCode::Ascm => "ascm",
            ServiceCode::Ros => "ros",
            ServiceCode::DmsEnterprise => "dms-enterprise",
            ServiceCode::Quickbi => "quickbi",
            ServiceCode::Odps => "odps",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ServiceCode::Ecs => "2014-05-26",
            ServiceCode::Vpc => "2016-04-28",
            ServiceCode::Slb => "2014-05-15",
            ServiceCode::Dds => "2015-12-01",
            ServiceCode::Ess => "2014-08-28",
            ServiceCode::Kms => "2016-01-20",
            ServiceCode::Rds => "2014-08-15",
            ServiceCode::Ram => "2015-05-01",
            ServiceCode::PolarDb => "2017-08-01",
            ServiceCode::Gpdb => "2016-05-03",
            ServiceCode::Elasticsearch => "2017-06-13",
            ServiceCode::Hbase => "2019-01-01",
            ServiceCode::Adb => "2019-03-15",
            ServiceCode::RKvStore => "2015-01-01",
            ServiceCode::Ons => "2019-02-14",
            ServiceCode::Alidns => "2015-01-09",
            ServiceCode::Edas => "2017-08-01",
            ServiceCode::Cr => "2016-06-07",
            ServiceCode::CrEe => "2018-12-01",
            ServiceCode::Cms => "2019-01-01",
            ServiceCode::MaxCompute => "2019-06-12",
            ServiceCode::BssOpenApi => "2017-12-14",
            ServiceCode::Cdn => "2018-05-10",
            ServiceCode::SlsPop => "2019-10-23",
            ServiceCode::Location => "2015-06-12",
            ServiceCode::Ascm => "2019-05-10",
            ServiceCode::Ros => "2019-09-10",
            ServiceCode::DmsEnterprise => "2018-11-01",
            ServiceCode::Quickbi => "2020-08-08",
            ServiceCode::Odps => "2019-06-12",
        }
    }

    /// Code registered with the location service
    pub fn location_code(&self) -> &'static str {
        match self {
            ServiceCode::Adb => "ads",
            ServiceCode::RKvStore => "redisa",
            ServiceCode::Cr | ServiceCode::CrEe => "acr",
            ServiceCode::MaxCompute => "odps",
            ServiceCode::DmsEnterprise => "dmsenterprise",
            other => other.product(),
        }
    }

    pub fn policy(&self) -> EndpointPolicy {
        match self {
            ServiceCode::Gpdb | ServiceCode::Ros | ServiceCode::Odps => EndpointPolicy::Discover,
            ServiceCode::DmsEnterprise => EndpointPolicy::Fallback("dms-enterprise.aliyuncs.com"),
            ServiceCode::Quickbi => EndpointPolicy::Fallback("quickbi.{region}.aliyuncs.com"),
            ServiceCode::Ascm => EndpointPolicy::Fallback("eds-user.{region}.aliyuncs.com"),
            ServiceCode::MaxCompute => EndpointPolicy::Fallback("maxcompute.aliyuncs.com"),
            ServiceCode::Location => EndpointPolicy::Fallback("location-readonly.aliyuncs.com"),
            _ => EndpointPolicy::Required,
        }
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        match self {
            ServiceCode::Ecs => ECS_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_codes_are_unique() {
        let products: std::collections::HashSet<_> =
            ServiceCode::ALL.iter().map(|code| code.product()).collect();
        assert_eq!(products.len(), ServiceCode::ALL.len());
        assert_eq!(ServiceCode::ALL.len(), 30);
    }

    #[test]
    fn location_codes_differ_where_registered_differently() {
        assert_eq!(ServiceCode::Adb.location_code(), "ads");
        assert_eq!(ServiceCode::Dds.location_code(), "dds");
    }

    #[test]
    fn ecs_gets_longer_timeout() {
        assert_eq!(ServiceCode::Ecs.timeout(), Duration::from_secs(60));
        assert_eq!(ServiceCode::Dds.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn fallback_services() {
        assert_eq!(
            ServiceCode::Quickbi.policy(),
            EndpointPolicy::Fallback("quickbi.{region}.aliyuncs.com")
        );
        assert_eq!(ServiceCode::Dds.policy(), EndpointPolicy::Required);
        assert_eq!(ServiceCode::Gpdb.policy(), EndpointPolicy::Discover);
    }
}
