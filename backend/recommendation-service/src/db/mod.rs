pub mod feature_repo;

pub use feature_repo::PgFeatureRepo;
