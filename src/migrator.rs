use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_tables_and_sessions::Migration),
            Box::new(m20240101_000002_create_menu_items_table::Migration),
            Box::new(m20240101_000003_create_orders_tables::Migration),
            Box::new(m20240101_000004_create_payments_table::Migration),
            Box::new(m20240101_000005_create_notifications_table::Migration),
        ]
    }
}

mod m20240101_000001_create_tables_and_sessions {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_tables_and_sessions"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tables::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tables::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Tables::TableNumber)
                                .string_len(20)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Tables::QrCode).string().null())
                        .col(
                            ColumnDef::new(Tables::Capacity)
                                .integer()
                                .not_null()
                                .default(4),
                        )
                        .col(
                            ColumnDef::new(Tables::Status)
                                .string_len(20)
                                .not_null()
                                .default("available"),
                        )
                        .col(
                            ColumnDef::new(Tables::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Tables::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CustomerSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerSessions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerSessions::TableId).uuid().not_null())
                        .col(
                            ColumnDef::new(CustomerSessions::SessionToken)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CustomerSessions::CustomerName).string().null())
                        .col(
                            ColumnDef::new(CustomerSessions::CustomerPhone)
                                .string_len(32)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CustomerSessions::StartedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerSessions::EndedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_customer_sessions_table")
                                .from(CustomerSessions::Table, CustomerSessions::TableId)
                                .to(Tables::Table, Tables::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customer_sessions_table_id")
                        .table(CustomerSessions::Table)
                        .col(CustomerSessions::TableId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomerSessions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Tables::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Tables {
        Table,
        Id,
        TableNumber,
        QrCode,
        Capacity,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CustomerSessions {
        Table,
        Id,
        TableId,
        SessionToken,
        CustomerName,
        CustomerPhone,
        StartedAt,
        EndedAt,
    }
}

mod m20240101_000002_create_menu_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_menu_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MenuItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(MenuItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(MenuItems::CategoryId).uuid().null())
                        .col(ColumnDef::new(MenuItems::Name).string().not_null())
                        .col(ColumnDef::new(MenuItems::Description).text().null())
                        .col(
                            ColumnDef::new(MenuItems::Price)
                                .decimal_len(18, 4)
                                .not_null()
                                .check(Expr::col(MenuItems::Price).gte(0)),
                        )
                        .col(
                            ColumnDef::new(MenuItems::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(MenuItems::PreparationTime).integer().null())
                        // Guarded decrements rely on this never going below zero
                        .col(
                            ColumnDef::new(MenuItems::StockQuantity)
                                .integer()
                                .null()
                                .check(Expr::col(MenuItems::StockQuantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(MenuItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MenuItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MenuItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MenuItems {
        Table,
        Id,
        CategoryId,
        Name,
        Description,
        Price,
        IsAvailable,
        PreparationTime,
        StockQuantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_orders_tables"
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
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::SessionId).uuid().not_null())
                        .col(ColumnDef::new(Orders::TableId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(18, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::TaxAmount).decimal_len(18, 4).not_null())
                        .col(
                            ColumnDef::new(Orders::ServiceCharge)
                                .decimal_len(18, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::GrandTotal).decimal_len(18, 4).not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(50).null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, col) in [
                ("idx_orders_session_id", Orders::SessionId),
                ("idx_orders_table_id", Orders::TableId),
                ("idx_orders_status", Orders::Status),
                ("idx_orders_created_at", Orders::CreatedAt),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Orders::Table)
                            .col(col)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::MenuItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(OrderItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(18, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::Subtotal)
                                .decimal_len(18, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Notes).text().null())
                        .col(ColumnDef::new(OrderItems::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
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
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderSequences::Day)
                                .string_len(8)
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderSequences::LastValue)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLogs::MenuItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryLogs::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLogs::Reason).string_len(50).not_null())
                        .col(ColumnDef::new(InventoryLogs::OrderItemId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_logs_menu_item_id")
                        .table(InventoryLogs::Table)
                        .col(InventoryLogs::MenuItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderSequences::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        SessionId,
        TableId,
        Status,
        PaymentStatus,
        TotalAmount,
        TaxAmount,
        ServiceCharge,
        GrandTotal,
        PaymentMethod,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        MenuItemId,
        Quantity,
        UnitPrice,
        Subtotal,
        Notes,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderSequences {
        Table,
        Day,
        LastValue,
    }

    #[derive(DeriveIden)]
    enum InventoryLogs {
        Table,
        Id,
        MenuItemId,
        QuantityChange,
        Reason,
        OrderItemId,
        CreatedAt,
    }
}

mod m20240101_000004_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(Payments::GatewayOrderId)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::TransactionId).string().null())
                        .col(ColumnDef::new(Payments::PaymentType).string_len(50).null())
                        .col(
                            ColumnDef::new(Payments::TransactionStatus)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::TransactionTime)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payments::GrossAmount)
                                .decimal_len(18, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Payments::VaNumber).string_len(50).null())
                        .col(ColumnDef::new(Payments::Bank).string_len(50).null())
                        .col(ColumnDef::new(Payments::FraudStatus).string_len(50).null())
                        .col(ColumnDef::new(Payments::StatusMessage).string().null())
                        .col(ColumnDef::new(Payments::SnapToken).string().null())
                        .col(ColumnDef::new(Payments::RedirectUrl).text().null())
                        .col(ColumnDef::new(Payments::RawPayload).text().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        OrderId,
        GatewayOrderId,
        TransactionId,
        PaymentType,
        TransactionStatus,
        TransactionTime,
        GrossAmount,
        Currency,
        VaNumber,
        Bank,
        FraudStatus,
        StatusMessage,
        SnapToken,
        RedirectUrl,
        RawPayload,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_notifications_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::OrderId).uuid().null())
                        .col(ColumnDef::new(Notifications::TableId).uuid().null())
                        .col(ColumnDef::new(Notifications::Kind).string_len(32).not_null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::ReadAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_is_read")
                        .table(Notifications::Table)
                        .col(Notifications::IsRead)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        OrderId,
        TableId,
        Kind,
        Message,
        IsRead,
        ReadAt,
        CreatedAt,
    }
}
