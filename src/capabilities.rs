//! WMS GetCapabilities parsing.
//!
//! The capability document drives three things: the styles offered for a
//! WMS layer, the legend-image URL shown in the legend box, and the
//! declared dimensions (name -> comma-separated values) used to build
//! dimension selectors. Malformed XML propagates as an error; the
//! dispatcher catches it at the UI boundary.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

use crate::error::{EkmanError, Result};

/// Capability summary for one advertised WMS layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerCapability {
    /// Style names, in document order
    pub styles: Vec<String>,
    /// Legend-image URLs, aligned with `styles`
    pub legend_urls: Vec<String>,
    /// [min_lon, min_lat, max_lon, max_lat] from the first BoundingBox
    pub bbox: Option<[f64; 4]>,
    /// Declared dimension name -> ordered values
    pub dimensions: BTreeMap<String, Vec<String>>,
}

/// Capabilities provider, injected into the dispatcher so activation can
/// be exercised against an in-memory document set.
#[async_trait]
pub trait WmsCapabilities: Send + Sync {
    async fn capabilities(&self, base_url: &str) -> Result<BTreeMap<String, LayerCapability>>;
}

/// Production provider: GetCapabilities over HTTP.
pub struct HttpCapabilities {
    http: reqwest::Client,
}

impl HttpCapabilities {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl WmsCapabilities for HttpCapabilities {
    async fn capabilities(&self, base_url: &str) -> Result<BTreeMap<String, LayerCapability>> {
        fetch_capabilities(&self.http, base_url).await
    }
}

/// Fetch and parse the capabilities of a WMS endpoint.
pub async fn fetch_capabilities(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<BTreeMap<String, LayerCapability>> {
    let url = format!("{}?service=WMS&request=GetCapabilities", base_url);
    let xml = client.get(&url).send().await?.text().await?;
    parse_capabilities(&xml)
}

/// What the text of the current element should be routed into.
enum TextTarget {
    None,
    LayerName,
    StyleName,
    Dimension(String),
}

/// Parse a GetCapabilities document into per-layer capability summaries.
pub fn parse_capabilities(xml: &str) -> Result<BTreeMap<String, LayerCapability>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut layers: BTreeMap<String, LayerCapability> = BTreeMap::new();

    // Layer elements nest in WMS documents; each level gets its own
    // pending entry on the stack.
    let mut stack: Vec<(Option<String>, LayerCapability)> = Vec::new();
    let mut in_style = false;
    let mut pending_style: Option<String> = None;
    let mut pending_legend: Option<String> = None;
    let mut target = TextTarget::None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"Layer" => {
                    stack.push((None, LayerCapability::default()));
                }
                b"Style" if !stack.is_empty() => {
                    in_style = true;
                    pending_style = None;
                    pending_legend = None;
                }
                b"Name" if !stack.is_empty() => {
                    target = if in_style {
                        TextTarget::StyleName
                    } else {
                        TextTarget::LayerName
                    };
                    text.clear();
                }
                b"Dimension" if !stack.is_empty() => {
                    let name = attribute_value(&e, b"name");
                    if let Some(name) = name {
                        target = TextTarget::Dimension(name);
                        text.clear();
                    }
                }
                b"BoundingBox" if !stack.is_empty() => {
                    if let Some((_, cap)) = stack.last_mut() {
                        if cap.bbox.is_none() {
                            cap.bbox = parse_bounding_box(&e);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"OnlineResource" if in_style => {
                    if pending_legend.is_none() {
                        pending_legend = attribute_value(&e, b"xlink:href");
                    }
                }
                b"BoundingBox" if !stack.is_empty() => {
                    if let Some((_, cap)) = stack.last_mut() {
                        if cap.bbox.is_none() {
                            cap.bbox = parse_bounding_box(&e);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                let unescaped = t.unescape().map_err(|e| EkmanError::Capabilities {
                    message: format!("Bad text node: {}", e),
                })?;
                text.push_str(&unescaped);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Name" => {
                    match std::mem::replace(&mut target, TextTarget::None) {
                        TextTarget::LayerName => {
                            if let Some((name, _)) = stack.last_mut() {
                                *name = Some(text.clone());
                            }
                        }
                        TextTarget::StyleName => {
                            pending_style = Some(text.clone());
                        }
                        _ => {}
                    }
                    text.clear();
                }
                b"Dimension" => {
                    if let TextTarget::Dimension(name) =
                        std::mem::replace(&mut target, TextTarget::None)
                    {
                        let values: Vec<String> = text
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect();
                        if let Some((_, cap)) = stack.last_mut() {
                            cap.dimensions.insert(name, values);
                        }
                    }
                    text.clear();
                }
                b"Style" => {
                    if let Some((_, cap)) = stack.last_mut() {
                        if let Some(style) = pending_style.take() {
                            cap.styles.push(style);
                            cap.legend_urls.push(pending_legend.take().unwrap_or_default());
                        }
                    }
                    in_style = false;
                }
                b"Layer" => {
                    if let Some((name, cap)) = stack.pop() {
                        if let Some(name) = name {
                            layers.insert(name, cap);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EkmanError::Capabilities {
                    message: format!(
                        "XML parsing error at position {}: {}",
                        reader.buffer_position(),
                        e
                    ),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(layers)
}

fn attribute_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn parse_bounding_box(e: &quick_xml::events::BytesStart<'_>) -> Option<[f64; 4]> {
    let minx = attribute_value(e, b"minx")?.parse().ok()?;
    let miny = attribute_value(e, b"miny")?.parse().ok()?;
    let maxx = attribute_value(e, b"maxx")?.parse().ok()?;
    let maxy = attribute_value(e, b"maxy")?.parse().ok()?;
    Some([minx, miny, maxx, maxy])
}

/// Resolve the legend-image URL for a layer from parsed capabilities:
/// the first advertised LegendURL, with stray `amp;` artifacts removed.
pub fn legend_graphic_url(
    capabilities: &BTreeMap<String, LayerCapability>,
    layer: &str,
) -> Option<String> {
    capabilities
        .get(layer)
        .and_then(|cap| cap.legend_urls.iter().find(|u| !u.is_empty()))
        .map(|u| u.replace("amp;", ""))
}

/// Fallback GetLegendGraphic URL used when capabilities yield no legend.
pub fn fallback_legend_url(base_url: &str, layer: &str) -> String {
    format!(
        "{}?request=GetLegendGraphic&layer={}&SERVICE=wms&format=image/png",
        base_url, layer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CAPABILITIES: &str = r#"
<WMS_Capabilities>
  <Capability>
    <Layer>
      <Name>root</Name>
      <Layer>
        <Name>currents_east</Name>
        <Title>Eastward currents</Title>
        <BoundingBox CRS="CRS:84" minx="-4.0" miny="50.0" maxx="4.0" maxy="58.0"/>
        <Dimension name="time" units="ISO8601">2024-01-01T00:00:00Z,2024-01-02T00:00:00Z</Dimension>
        <Dimension name="elevation" units="m">0,10,50</Dimension>
        <Style>
          <Name>boxfill/rainbow</Name>
          <LegendURL width="110" height="264">
            <Format>image/png</Format>
            <OnlineResource xlink:href="https://example.org/legend?style=rainbow"/>
          </LegendURL>
        </Style>
        <Style>
          <Name>boxfill/greyscale</Name>
          <LegendURL width="110" height="264">
            <Format>image/png</Format>
            <OnlineResource xlink:href="https://example.org/legend?style=greyscale"/>
          </LegendURL>
        </Style>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>
"#;

    #[test]
    fn test_parse_capabilities() {
        let layers = parse_capabilities(CAPABILITIES).unwrap();
        let cap = &layers["currents_east"];

        assert_eq!(cap.styles, vec!["boxfill/rainbow", "boxfill/greyscale"]);
        assert_eq!(
            cap.legend_urls,
            vec![
                "https://example.org/legend?style=rainbow",
                "https://example.org/legend?style=greyscale"
            ]
        );
        assert_eq!(cap.bbox, Some([-4.0, 50.0, 4.0, 58.0]));
        assert_eq!(cap.dimensions["time"].len(), 2);
        assert_eq!(cap.dimensions["elevation"], vec!["0", "10", "50"]);

        // Outer layer carries no style/bbox of its own
        assert!(layers["root"].styles.is_empty());
    }

    #[test]
    fn test_legend_graphic_url() {
        let layers = parse_capabilities(CAPABILITIES).unwrap();
        assert_eq!(
            legend_graphic_url(&layers, "currents_east").as_deref(),
            Some("https://example.org/legend?style=rainbow")
        );
        assert_eq!(legend_graphic_url(&layers, "missing"), None);
    }

    #[test]
    fn test_fallback_legend_url() {
        let url = fallback_legend_url("https://example.org/wms", "sst");
        assert_eq!(
            url,
            "https://example.org/wms?request=GetLegendGraphic&layer=sst&SERVICE=wms&format=image/png"
        );
    }
}
