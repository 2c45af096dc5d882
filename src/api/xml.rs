//! S3 XML response builders, AWS 2006-03-01 envelope format.

use chrono::{DateTime, Utc};

/// Render a timestamp using the fixed `YYYY-MM-DDTHH:MM:SS.000Z` pattern
/// (literal zero milliseconds, not real sub-second precision).
fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!("{}.000Z", ts.format("%Y-%m-%dT%H:%M:%S"))
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

/// `ListBucketResult` for `GET /{bucket}/?prefix=&delimiter=&marker=&max-keys=`.
#[derive(Debug, Clone)]
pub struct ListBucketResult {
    pub name: String,
    pub prefix: String,
    pub marker: String,
    pub delimiter: String,
    pub max_keys: u64,
    pub is_truncated: bool,
    pub contents: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
}

impl ListBucketResult {
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
        xml.push('\n');
        xml.push_str(&format!("  <Name>{}</Name>\n", escape_xml(&self.name)));
        xml.push_str(&format!("  <Prefix>{}</Prefix>\n", escape_xml(&self.prefix)));
        xml.push_str(&format!("  <Marker>{}</Marker>\n", escape_xml(&self.marker)));
        if !self.delimiter.is_empty() {
            xml.push_str(&format!("  <Delimiter>{}</Delimiter>\n", escape_xml(&self.delimiter)));
        }
        xml.push_str(&format!("  <MaxKeys>{}</MaxKeys>\n", self.max_keys));
        xml.push_str(&format!("  <IsTruncated>{}</IsTruncated>\n", self.is_truncated));

        for obj in &self.contents {
            xml.push_str("  <Contents>\n");
            xml.push_str(&format!("    <Key>{}</Key>\n", escape_xml(&obj.key)));
            xml.push_str(&format!("    <LastModified>{}</LastModified>\n", format_timestamp(obj.last_modified)));
            xml.push_str(&format!("    <ETag>&quot;{}&quot;</ETag>\n", obj.etag));
            xml.push_str(&format!("    <Size>{}</Size>\n", obj.size));
            xml.push_str("    <StorageClass>STANDARD</StorageClass>\n");
            xml.push_str("  </Contents>\n");
        }

        for cp in &self.common_prefixes {
            xml.push_str("  <CommonPrefixes>\n");
            xml.push_str(&format!("    <Prefix>{}</Prefix>\n", escape_xml(cp)));
            xml.push_str("  </CommonPrefixes>\n");
        }

        xml.push_str("</ListBucketResult>");
        xml
    }
}

#[derive(Debug, Clone)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// `ListAllMyBucketsResult` for `GET /` at the service level.
#[derive(Debug, Clone)]
pub struct ListBucketsResult {
    pub owner_id: String,
    pub owner_name: String,
    pub buckets: Vec<BucketEntry>,
}

impl ListBucketsResult {
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
        xml.push('\n');
        xml.push_str("  <Owner>\n");
        xml.push_str(&format!("    <ID>{}</ID>\n", escape_xml(&self.owner_id)));
        xml.push_str(&format!("    <DisplayName>{}</DisplayName>\n", escape_xml(&self.owner_name)));
        xml.push_str("  </Owner>\n");
        xml.push_str("  <Buckets>\n");
        for bucket in &self.buckets {
            xml.push_str("    <Bucket>\n");
            xml.push_str(&format!("      <Name>{}</Name>\n", escape_xml(&bucket.name)));
            xml.push_str(&format!("      <CreationDate>{}</CreationDate>\n", format_timestamp(bucket.creation_date)));
            xml.push_str("    </Bucket>\n");
        }
        xml.push_str("  </Buckets>\n");
        xml.push_str("</ListAllMyBucketsResult>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn escape_xml_covers_reserved_characters() {
        assert_eq!(escape_xml("a<b>c"), "a&lt;b&gt;c");
        assert_eq!(escape_xml("a&b"), "a&amp;b");
    }

    #[test]
    fn timestamp_uses_literal_zero_milliseconds() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(ts), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn list_bucket_result_renders_contents_and_common_prefixes() {
        let result = ListBucketResult {
            name: "test".into(),
            prefix: "a/".into(),
            marker: String::new(),
            delimiter: "/".into(),
            max_keys: 1000,
            is_truncated: false,
            contents: vec![ObjectEntry {
                key: "a/1".into(),
                size: 1,
                last_modified: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                etag: "deadbeef".into(),
            }],
            common_prefixes: vec!["sub".into()],
        };
        let xml = result.to_xml();
        assert!(xml.contains("<Key>a/1</Key>"));
        assert!(xml.contains("<Prefix>sub</Prefix>"));
        assert!(xml.contains("<Name>test</Name>"));
    }

    #[test]
    fn list_buckets_result_renders_every_bucket() {
        let result = ListBucketsResult {
            owner_id: "alice".into(),
            owner_name: "alice".into(),
            buckets: vec![
                BucketEntry { name: "test".into(), creation_date: Utc::now() },
                BucketEntry { name: "test2".into(), creation_date: Utc::now() },
            ],
        };
        let xml = result.to_xml();
        assert!(xml.contains("<Bucket><Name>test</Name>") || xml.contains("<Name>test</Name>"));
        assert!(xml.contains("<Name>test2</Name>"));
    }
}
