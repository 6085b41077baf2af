use crate::core::geo::{tile_to_lat_lng, PixelAddress};
use serde::{Deserialize, Serialize};

/// A bookmarked pixel. Coordinates are kept exactly as selected, without
/// normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritePixel {
    pub tile_x: i64,
    pub tile_y: i64,
    pub pixel_x: u32,
    pub pixel_y: u32,
    pub name: String,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl FavoritePixel {
    /// Bookmark `address`. Without a name, one is derived from its position.
    pub fn new(address: PixelAddress, name: Option<String>, timestamp: u64) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name(&address));
        Self {
            tile_x: address.tile_x,
            tile_y: address.tile_y,
            pixel_x: address.pixel_x,
            pixel_y: address.pixel_y,
            name,
            timestamp,
        }
    }

    pub fn address(&self) -> PixelAddress {
        PixelAddress::new(self.tile_x, self.tile_y, self.pixel_x, self.pixel_y)
    }

    pub fn key(&self) -> String {
        favorite_key(&self.address())
    }
}

/// `"{tileX}-{tileY}-{pixelX}-{pixelY}"`
pub fn favorite_key(address: &PixelAddress) -> String {
    format!(
        "{}-{}-{}-{}",
        address.tile_x, address.tile_y, address.pixel_x, address.pixel_y
    )
}

fn default_name(address: &PixelAddress) -> String {
    let position = tile_to_lat_lng(address.tile_x, address.tile_y, address.pixel_x, address.pixel_y);
    format!(
        "Lat {:.5}, Lng {:.5}, Tile({},{}) Pixel({},{})",
        position.lat, position.lng, address.tile_x, address.tile_y, address.pixel_x, address.pixel_y
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_and_key() {
        let favorite = FavoritePixel::new(PixelAddress::new(1024, 1024, 0, 0), None, 7);
        assert_eq!(favorite.key(), "1024-1024-0-0");
        assert_eq!(favorite.name, "Lat 0.00000, Lng 0.00000, Tile(1024,1024) Pixel(0,0)");
    }

    #[test]
    fn test_document_field_names() {
        let favorite = FavoritePixel::new(PixelAddress::new(-1, 3, 4, 5), Some("home".into()), 10);
        let json = serde_json::to_value(&favorite).unwrap();
        assert_eq!(json["tileX"], -1);
        assert_eq!(json["pixelY"], 5);
        assert_eq!(json["name"], "home");
        assert_eq!(favorite.key(), "-1-3-4-5");
    }
}
