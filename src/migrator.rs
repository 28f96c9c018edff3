use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240110_000001_create_orders_table::Migration),
            Box::new(m20240110_000002_create_order_items_table::Migration),
            Box::new(m20240110_000003_create_pickup_tokens_table::Migration),
            Box::new(m20240110_000004_create_pickup_secrets_table::Migration),
            Box::new(m20240110_000005_create_payment_events_table::Migration),
            Box::new(m20240110_000006_create_email_queue_table::Migration),
            Box::new(m20240110_000007_create_gdpr_consents_table::Migration),
        ]
    }
}

mod m20240110_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::FulfillmentMode)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PickupLocationId).string_len(50))
                        .col(
                            ColumnDef::new(Orders::CustomerEmail)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::CustomerPhone).string_len(30))
                        .col(
                            ColumnDef::new(Orders::PaymentSessionId)
                                .string_len(255)
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::PaymentIntentId).string_len(255))
                        .col(
                            ColumnDef::new(Orders::ItemsTotalCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::ShippingTotalCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::GrandTotalCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PaidAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Orders::FulfilledAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Orders::CanceledAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Orders::TrackingNumber).string_len(255))
                        .col(ColumnDef::new(Orders::TrackingUrl).text())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_customer_email")
                        .table(Orders::Table)
                        .col(Orders::CustomerEmail)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Orders {
        Table,
        Id,
        Status,
        FulfillmentMode,
        PickupLocationId,
        CustomerEmail,
        CustomerPhone,
        PaymentSessionId,
        PaymentIntentId,
        ItemsTotalCents,
        ShippingTotalCents,
        GrandTotalCents,
        CreatedAt,
        PaidAt,
        FulfilledAt,
        CanceledAt,
        TrackingNumber,
        TrackingUrl,
    }
}

mod m20240110_000002_create_order_items_table {
    use sea_orm_migration::prelude::*;

    use super::m20240110_000001_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000002_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::ProductId)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Qty).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPriceCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::ShippingCentsPerUnit)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::NameSnapshot)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::ImageSnapshot).string_len(500))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Qty,
        UnitPriceCents,
        ShippingCentsPerUnit,
        NameSnapshot,
        ImageSnapshot,
    }
}

mod m20240110_000003_create_pickup_tokens_table {
    use sea_orm_migration::prelude::*;

    use super::m20240110_000001_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000003_create_pickup_tokens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PickupTokens::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PickupTokens::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickupTokens::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PickupTokens::TokenHash)
                                .string_len(255)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PickupTokens::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PickupTokens::UsedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(PickupTokens::UsedBy).string_len(255))
                        .col(
                            ColumnDef::new(PickupTokens::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pickup_tokens_order")
                                .from(PickupTokens::Table, PickupTokens::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PickupTokens::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PickupTokens {
        Table,
        Id,
        OrderId,
        TokenHash,
        ExpiresAt,
        UsedAt,
        UsedBy,
        CreatedAt,
    }
}

mod m20240110_000004_create_pickup_secrets_table {
    use sea_orm_migration::prelude::*;

    use super::m20240110_000001_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000004_create_pickup_secrets_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PickupSecrets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PickupSecrets::OrderId)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickupSecrets::Secret)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickupSecrets::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pickup_secrets_order")
                                .from(PickupSecrets::Table, PickupSecrets::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PickupSecrets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PickupSecrets {
        Table,
        OrderId,
        Secret,
        ExpiresAt,
    }
}

mod m20240110_000005_create_payment_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000005_create_payment_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentEvents::EventId)
                                .string_len(255)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentEvents::EventType)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentEvents::ProcessedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentEvents {
        Table,
        Id,
        EventId,
        EventType,
        ProcessedAt,
    }
}

mod m20240110_000006_create_email_queue_table {
    use sea_orm_migration::prelude::*;

    use super::m20240110_000001_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000006_create_email_queue_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(EmailQueue::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(EmailQueue::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(EmailQueue::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(EmailQueue::EmailType)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(EmailQueue::RecipientEmail)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(EmailQueue::Status).string_len(20).not_null())
                        .col(ColumnDef::new(EmailQueue::Attempts).integer().not_null())
                        .col(ColumnDef::new(EmailQueue::LastError).text())
                        .col(
                            ColumnDef::new(EmailQueue::NextRetryAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(EmailQueue::SentAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(EmailQueue::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_email_queue_order")
                                .from(EmailQueue::Table, EmailQueue::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_email_queue_status_retry")
                        .table(EmailQueue::Table)
                        .col(EmailQueue::Status)
                        .col(EmailQueue::NextRetryAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_email_queue_order")
                        .table(EmailQueue::Table)
                        .col(EmailQueue::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(EmailQueue::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum EmailQueue {
        Table,
        Id,
        OrderId,
        EmailType,
        RecipientEmail,
        Status,
        Attempts,
        LastError,
        NextRetryAt,
        SentAt,
        CreatedAt,
    }
}

mod m20240110_000007_create_gdpr_consents_table {
    use sea_orm_migration::prelude::*;

    use super::m20240110_000001_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240110_000007_create_gdpr_consents_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GdprConsents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GdprConsents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GdprConsents::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(GdprConsents::ConsentedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GdprConsents::IpAddress).string_len(45))
                        .col(ColumnDef::new(GdprConsents::UserAgent).text())
                        .col(
                            ColumnDef::new(GdprConsents::PrivacyPolicyVersion)
                                .string_len(10)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_gdpr_consents_order")
                                .from(GdprConsents::Table, GdprConsents::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GdprConsents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum GdprConsents {
        Table,
        Id,
        OrderId,
        ConsentedAt,
        IpAddress,
        UserAgent,
        PrivacyPolicyVersion,
    }
}
