//! Project container codec
//!
//! A project is stored as indented UTF-8 XML with four levels of tags:
//!
//! ```text
//! <project format="1" name=".." next-region=".." next-page="..">
//!   <settings default-profile=".." source-locale=".." target-locale="..">
//!     <font family=".." style=".." bold="false" italic="false"/>
//!   </settings>
//!   <profile name="Latin" script="latin" case="unicode" normalize="none"/>
//!   <page id="1" image="pages/001.png" width="800" height="1200" rotation="0">
//!     <region id="1" z="0" profile="CJK" confidence="0.93" edited="false" ..>
//!       <rect x=".." y=".." width=".." height=".."/>
//!       <source>..</source>
//!       <translation>..</translation>
//!       <style ..><stroke width="2" color="#FFFFFFFF"/></style>
//!     </region>
//!   </page>
//! </project>
//! ```
//!
//! Elements the decoder does not know are kept as raw XML on the owning
//! project, settings, profile, page, region or style and written back after
//! the known children. Unknown attributes are ignored.

mod decode;
mod encode;
mod error;

pub use decode::decode;
pub use encode::encode;
pub use error::{DecodeError, EncodeError};

/// Current container format version
pub const FORMAT_VERSION: u32 = 1;

const PROJECT: &str = "project";
const SETTINGS: &str = "settings";
const FONT: &str = "font";
const PROFILE: &str = "profile";
const PAGE: &str = "page";
const REGION: &str = "region";
const RECT: &str = "rect";
const POLYGON: &str = "polygon";
const SOURCE: &str = "source";
const OCR_LATEST: &str = "ocr-latest";
const TRANSLATION: &str = "translation";
const OVERRIDE: &str = "override";
const STYLE: &str = "style";
const STROKE: &str = "stroke";
const SHADOW: &str = "shadow";
const BLUR: &str = "blur";
const GRADIENT: &str = "gradient";

#[cfg(test)]
mod tests;
