//! Redirect targets for a click
//!
//! Turns the defaulted intent into the URLs the landing page needs: the app's
//! custom-scheme deep link, the platform store listing, an Android intent URL
//! that falls back to the store, and the website page for desktop visitors.

use anyhow::Context;
use serde::Serialize;
use url::{form_urlencoded, Url};

use crate::attribution::IntentParams;

/// App identifiers and store locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationConfig {
    pub app_scheme: String,
    pub android_package: String,
    pub ios_app_id: String,
    pub ios_store_url: String,
    pub android_store_url: String,
    pub website_url: String,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            app_scheme: "yourapp".to_string(),
            android_package: "com.yourapp".to_string(),
            ios_app_id: "123456789".to_string(),
            ios_store_url: "https://apps.apple.com/app/yourapp/id123456789".to_string(),
            android_store_url: "https://play.google.com/store/apps/details?id=com.yourapp"
                .to_string(),
            website_url: "https://yourwebsite.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobilePlatform {
    Ios,
    Android,
}

impl MobilePlatform {
    pub fn from_platform_name(name: Option<&str>) -> Option<Self> {
        match name {
            Some("iOS") => Some(MobilePlatform::Ios),
            Some("Android") => Some(MobilePlatform::Android),
            _ => None,
        }
    }
}

/// Where a mobile visitor should be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRedirect {
    pub deep_link_url: String,
    pub store_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_url: Option<String>,
}

/// Form-encodes one component of the Android intent URL.
fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

impl PresentationConfig {
    /// Fails when the scheme or website cannot form a URL.
    pub fn validate(&self) -> anyhow::Result<()> {
        let sample = IntentParams::with_defaults(None, None, None);
        self.deep_link_url(&sample)
            .with_context(|| format!("APP_SCHEME '{}' is not usable", self.app_scheme))?;
        self.content_url(&sample)
            .with_context(|| format!("WEBSITE_URL '{}' is not usable", self.website_url))?;
        Ok(())
    }

    pub fn store_url(&self, platform: MobilePlatform) -> &str {
        match platform {
            MobilePlatform::Ios => &self.ios_store_url,
            MobilePlatform::Android => &self.android_store_url,
        }
    }

    pub fn deep_link_url(&self, intent: &IntentParams) -> anyhow::Result<String> {
        let mut url = Url::parse(&format!("{}://content/", self.app_scheme))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("{}:// URLs cannot take a path", self.app_scheme))?
            .pop_if_empty()
            .push(&intent.content);
        url.query_pairs_mut()
            .append_pair("campaign", &intent.campaign)
            .append_pair("source", &intent.source);
        Ok(url.into())
    }

    /// Android intent URL; Chrome opens the store when the app is missing.
    pub fn android_intent_url(&self, intent: &IntentParams) -> String {
        format!(
            "intent://{}#Intent;scheme={};package={};S.campaign={};S.source={};S.browser_fallback_url={};end",
            encode_component(&intent.content),
            self.app_scheme,
            self.android_package,
            encode_component(&intent.campaign),
            encode_component(&intent.source),
            encode_component(&self.android_store_url)
        )
    }

    /// Desktop visitors land on the web version of the content.
    pub fn content_url(&self, intent: &IntentParams) -> anyhow::Result<String> {
        let mut url = Url::parse(&self.website_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("{} cannot take a path", self.website_url))?
            .pop_if_empty()
            .push("content")
            .push(&intent.content);
        Ok(url.into())
    }

    pub fn app_redirect(
        &self,
        platform: MobilePlatform,
        intent: &IntentParams,
    ) -> anyhow::Result<AppRedirect> {
        Ok(AppRedirect {
            deep_link_url: self.deep_link_url(intent)?,
            store_url: self.store_url(platform).to_string(),
            intent_url: match platform {
                MobilePlatform::Android => Some(self.android_intent_url(intent)),
                MobilePlatform::Ios => None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> IntentParams {
        IntentParams::with_defaults(Some("promo42".to_string()), Some("summer sale".to_string()), None)
    }

    #[test]
    fn test_deep_link_url() {
        let cfg = PresentationConfig::default();
        assert_eq!(
            cfg.deep_link_url(&intent()).unwrap(),
            "yourapp://content/promo42?campaign=summer+sale&source=unknown"
        );
    }

    #[test]
    fn test_deep_link_escapes_path_and_query() {
        let cfg = PresentationConfig::default();
        let tricky = IntentParams::with_defaults(
            Some("a/b?c".to_string()),
            Some("x&source=evil".to_string()),
            None,
        );
        assert_eq!(
            cfg.deep_link_url(&tricky).unwrap(),
            "yourapp://content/a%2Fb%3Fc?campaign=x%26source%3Devil&source=unknown"
        );
    }

    #[test]
    fn test_ios_redirect_has_no_intent_url() {
        let cfg = PresentationConfig::default();
        let redirect = cfg.app_redirect(MobilePlatform::Ios, &intent()).unwrap();
        assert_eq!(redirect.store_url, cfg.ios_store_url);
        assert_eq!(redirect.intent_url, None);
    }

    #[test]
    fn test_android_intent_url_encodes_fallback() {
        let cfg = PresentationConfig::default();
        let redirect = cfg.app_redirect(MobilePlatform::Android, &intent()).unwrap();
        let url = redirect.intent_url.unwrap();
        assert!(url.starts_with("intent://promo42#Intent;scheme=yourapp;package=com.yourapp;"));
        assert!(url.contains("S.campaign=summer+sale;"));
        assert!(url.contains(
            "S.browser_fallback_url=https%3A%2F%2Fplay.google.com%2Fstore%2Fapps%2Fdetails%3Fid%3Dcom.yourapp;end"
        ));
    }

    #[test]
    fn test_content_url_for_desktop() {
        let mut cfg = PresentationConfig::default();
        cfg.website_url = "https://example.com/".to_string();
        let defaults = IntentParams::with_defaults(None, None, None);
        assert_eq!(
            cfg.content_url(&defaults).unwrap(),
            "https://example.com/content/default"
        );

        let summer = IntentParams::with_defaults(Some("夏".to_string()), None, None);
        assert_eq!(
            cfg.content_url(&summer).unwrap(),
            "https://example.com/content/%E5%A4%8F"
        );
    }

    #[test]
    fn test_validate_rejects_unusable_config() {
        assert!(PresentationConfig::default().validate().is_ok());

        let mut bad_scheme = PresentationConfig::default();
        bad_scheme.app_scheme = "your app".to_string();
        assert!(bad_scheme.validate().is_err());

        let mut bad_site = PresentationConfig::default();
        bad_site.website_url = "yourwebsite.com".to_string();
        assert!(bad_site.validate().is_err());
    }

    #[test]
    fn test_platform_from_name() {
        assert_eq!(MobilePlatform::from_platform_name(Some("iOS")), Some(MobilePlatform::Ios));
        assert_eq!(
            MobilePlatform::from_platform_name(Some("Android")),
            Some(MobilePlatform::Android)
        );
        assert_eq!(MobilePlatform::from_platform_name(Some("Windows")), None);
        assert_eq!(MobilePlatform::from_platform_name(None), None);
    }
}
