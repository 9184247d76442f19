/// Kind of asset moved by a transfer. Each chain keeps one cursor per asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumIter, serde::Serialize)]
pub enum AssetClass {
    #[strum(to_string = "fungible")]
    #[serde(rename = "fungible")]
    Fungible,

    #[strum(to_string = "nft")]
    #[serde(rename = "nft")]
    NonFungible,
}
