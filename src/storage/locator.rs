//! 目标定位符解析
//!
//! 形如 `oss://<id>:<secret>@<bucket>.<endpoint>/<prefix>`

use crate::error::{Result, SyncError};
use std::fmt;
use url::Url;

/// 解析后的目标定位符
#[derive(Clone, PartialEq, Eq)]
pub struct Locator {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub endpoint: String,
    /// 对象 key 前缀，原样保留（可能为空，不要求以 `/` 结尾）
    pub prefix: String,
}

impl Locator {
    pub fn parse(target: &str) -> Result<Self> {
        let url = Url::parse(target).map_err(|e| SyncError::Locator(format!("{}: {}", redact(target), e)))?;

        if url.username().is_empty() {
            return Err(SyncError::Locator("missing access key id".to_string()));
        }
        let access_key = decode(url.username())?;
        let secret_key = url
            .password()
            .map(decode)
            .transpose()?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::Locator("missing access key secret".to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| SyncError::Locator("missing host".to_string()))?;
        let (bucket, endpoint) = host
            .split_once('.')
            .filter(|(b, e)| !b.is_empty() && !e.is_empty())
            .ok_or_else(|| SyncError::Locator(format!("host '{}' is not <bucket>.<endpoint>", host)))?;

        let endpoint = match url.port() {
            Some(port) => format!("{}:{}", endpoint, port),
            None => endpoint.to_string(),
        };

        let prefix = decode(url.path().strip_prefix('/').unwrap_or(url.path()))?;

        Ok(Self {
            access_key,
            secret_key,
            bucket: bucket.to_string(),
            endpoint,
            prefix,
        })
    }

    /// 带协议的 endpoint，供 S3 客户端使用
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("https://{}", self.endpoint)
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn decode(s: &str) -> Result<String> {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .map_err(|e| SyncError::Locator(e.to_string()))
}

/// 错误信息中隐藏凭据
fn redact(target: &str) -> String {
    match (target.find("://"), target.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &target[..scheme_end + 3], &target[at..])
        }
        _ => target.to_string(),
    }
}
