pub mod encoder;
pub mod profile;
pub mod ranking;
pub mod scaler;
pub mod similarity;
pub mod tfidf;

pub use encoder::{CategoryEncoder, EncodedCatalog, FeatureEncoder, FeatureSpace};
pub use profile::{AggregatedProfile, ProfileBuilder};
pub use ranking::{rank_by_similarity, sort_by_final_score, BusinessRules};
pub use scaler::MinMaxScaler;
pub use similarity::{cosine_score, product_similarity};
pub use tfidf::TfIdfVectorizer;
