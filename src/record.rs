//! Canonical scheduling records and the row mapper that builds them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::campaign::Campaign;
use crate::schema::{FileSchema, Role};

/// Serialized name of [`Media::media_type`]; a column with this name overrides it.
const MEDIA_TYPE_KEY: &str = "mediaType";

/// Media payload: the declared media type plus any media-field columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub media_type: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

/// What one CSV row contributes before campaign fields are merged in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFragment {
    pub recipient: Option<String>,
    pub media: Option<Media>,
    pub parameters: Vec<String>,
}

/// Pipeline output, one per CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub recipient: Option<String>,
    pub campaign_id: String,
    pub template_id: String,
    /// Assigned downstream; always `None` here.
    pub media_id: Option<String>,
    pub media: Option<Media>,
    pub parameters: Vec<String>,
    pub active_start_hour: u8,
    pub active_start_minute: u8,
    pub active_end_hour: u8,
    pub active_end_minute: u8,
    pub active_on_weekends: bool,
    pub timezone: String,
}

impl CanonicalRecord {
    /// `campaign_id` and `template_id` come from the upload's file name; the
    /// activity window comes from the looked-up campaign.
    pub fn new(fragment: RowFragment, campaign_id: &str, template_id: &str, campaign: &Campaign) -> Self {
        Self {
            recipient: fragment.recipient,
            campaign_id: campaign_id.to_string(),
            template_id: template_id.to_string(),
            media_id: None,
            media: fragment.media,
            parameters: fragment.parameters,
            active_start_hour: campaign.active_start_hour,
            active_start_minute: campaign.active_start_minute,
            active_end_hour: campaign.active_end_hour,
            active_end_minute: campaign.active_end_minute,
            active_on_weekends: campaign.active_on_weekends,
            timezone: campaign.timezone.clone(),
        }
    }
}

/// Map one row by column role. Column 0 is never read, nor are cells past the
/// declared columns. Without a media type, media-field cells are dropped.
pub fn map_row<'a, I>(cells: I, schema: &FileSchema) -> RowFragment
where
    I: IntoIterator<Item = &'a str>,
{
    let mut fragment = RowFragment {
        media: schema.media_type.as_ref().map(|media_type| Media {
            media_type: media_type.clone(),
            fields: BTreeMap::new(),
        }),
        ..Default::default()
    };

    for (idx, cell) in cells.into_iter().enumerate().skip(1) {
        match schema.role(idx) {
            Some(Role::Recipient) => fragment.recipient = Some(cell.to_string()),
            Some(Role::Parameter) => {
                if !cell.is_empty() {
                    fragment.parameters.push(cell.to_string());
                }
            }
            Some(Role::MediaField(name)) => {
                if let Some(media) = fragment.media.as_mut() {
                    if name == MEDIA_TYPE_KEY {
                        media.media_type = cell.to_string();
                    } else {
                        media.fields.insert(name.clone(), cell.to_string());
                    }
                }
            }
            None => {}
        }
    }

    fragment
}
