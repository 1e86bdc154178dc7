use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create canonical_media table
        manager
            .create_table(
                Table::create()
                    .table(CanonicalMedia::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CanonicalMedia::GlobalId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CanonicalMedia::Title).string().not_null())
                    .col(ColumnDef::new(CanonicalMedia::Year).integer())
                    .col(
                        ColumnDef::new(CanonicalMedia::MediaType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CanonicalMedia::Season).integer())
                    .col(ColumnDef::new(CanonicalMedia::Episode).integer())
                    .col(ColumnDef::new(CanonicalMedia::TmdbId).big_integer())
                    .col(ColumnDef::new(CanonicalMedia::ImdbId).string())
                    .col(ColumnDef::new(CanonicalMedia::Images).json())
                    .col(
                        ColumnDef::new(CanonicalMedia::PrimarySourceKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CanonicalMedia::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CanonicalMedia::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create media_variants table
        manager
            .create_table(
                Table::create()
                    .table(MediaVariants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaVariants::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MediaVariants::GlobalId).string().not_null())
                    .col(
                        ColumnDef::new(MediaVariants::SourceKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(MediaVariants::Position).integer().not_null())
                    .col(
                        ColumnDef::new(MediaVariants::SourceLabel)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MediaVariants::Height).integer())
                    .col(ColumnDef::new(MediaVariants::VideoCodec).string())
                    .col(ColumnDef::new(MediaVariants::Container).string())
                    .col(ColumnDef::new(MediaVariants::LanguageTag).string())
                    .col(ColumnDef::new(MediaVariants::SizeBytes).big_integer())
                    .col(
                        ColumnDef::new(MediaVariants::Available)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(MediaVariants::Synthetic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(MediaVariants::PlaybackHints).json().not_null())
                    .col(
                        ColumnDef::new(MediaVariants::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_media_variants_canonical_media")
                            .from(MediaVariants::Table, MediaVariants::GlobalId)
                            .to(CanonicalMedia::Table, CanonicalMedia::GlobalId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_media_variants_global_id")
                    .table(MediaVariants::Table)
                    .col(MediaVariants::GlobalId)
                    .col(MediaVariants::Position)
                    .to_owned(),
            )
            .await?;

        // Create source_refs table
        manager
            .create_table(
                Table::create()
                    .table(SourceRefs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SourceRefs::SourceKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SourceRefs::SourceType).string().not_null())
                    .col(ColumnDef::new(SourceRefs::SourceLabel).string().not_null())
                    .col(ColumnDef::new(SourceRefs::MediaType).string().not_null())
                    .col(
                        ColumnDef::new(SourceRefs::OriginalTitle)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SourceRefs::CanonicalTitle)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SourceRefs::LinkState).string().not_null())
                    .col(ColumnDef::new(SourceRefs::CanonicalId).string())
                    .col(ColumnDef::new(SourceRefs::Raw).json().not_null())
                    .col(
                        ColumnDef::new(SourceRefs::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Backlog paging walks (source_type, link_state) in source_key order
        manager
            .create_index(
                Index::create()
                    .name("idx_source_refs_type_state")
                    .table(SourceRefs::Table)
                    .col(SourceRefs::SourceType)
                    .col(SourceRefs::LinkState)
                    .col(SourceRefs::SourceKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_source_refs_canonical_id")
                    .table(SourceRefs::Table)
                    .col(SourceRefs::CanonicalId)
                    .to_owned(),
            )
            .await?;

        // Create sync_ledger table
        manager
            .create_table(
                Table::create()
                    .table(SyncLedger::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncLedger::SourceType)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncLedger::Status).string().not_null())
                    .col(ColumnDef::new(SyncLedger::Mode).string())
                    .col(ColumnDef::new(SyncLedger::Checkpoint).integer())
                    .col(
                        ColumnDef::new(SyncLedger::ItemsPersisted)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncLedger::BacklogPending)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SyncLedger::BacklogEstimate)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncLedger::LastError).text())
                    .col(ColumnDef::new(SyncLedger::StartedAt).timestamp())
                    .col(ColumnDef::new(SyncLedger::CompletedAt).timestamp())
                    .col(
                        ColumnDef::new(SyncLedger::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncLedger::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SourceRefs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MediaVariants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CanonicalMedia::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum CanonicalMedia {
    Table,
    GlobalId,
    Title,
    Year,
    MediaType,
    Season,
    Episode,
    TmdbId,
    ImdbId,
    Images,
    PrimarySourceKey,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum MediaVariants {
    Table,
    Id,
    GlobalId,
    SourceKey,
    Position,
    SourceLabel,
    Height,
    VideoCodec,
    Container,
    LanguageTag,
    SizeBytes,
    Available,
    Synthetic,
    PlaybackHints,
    UpdatedAt,
}

#[derive(Iden)]
enum SourceRefs {
    Table,
    SourceKey,
    SourceType,
    SourceLabel,
    MediaType,
    OriginalTitle,
    CanonicalTitle,
    LinkState,
    CanonicalId,
    Raw,
    UpdatedAt,
}

#[derive(Iden)]
enum SyncLedger {
    Table,
    SourceType,
    Status,
    Mode,
    Checkpoint,
    ItemsPersisted,
    BacklogPending,
    BacklogEstimate,
    LastError,
    StartedAt,
    CompletedAt,
    UpdatedAt,
}
