use sea_orm_migration::prelude::*;

/// Embedded schema bootstrap. One migration per table family, applied by
/// deployments and by the test harness against a fresh database.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_partner_tables::Migration),
            Box::new(m20240101_000003_create_inventory_tables::Migration),
            Box::new(m20240101_000004_create_purchase_tables::Migration),
            Box::new(m20240101_000005_create_sales_tables::Migration),
            Box::new(m20240101_000006_create_reservation_tables::Migration),
            Box::new(m20240101_000007_create_invoicing_tables::Migration),
            Box::new(m20240101_000008_create_idempotency_table::Migration),
        ]
    }
}

mod m20240101_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::Branch).string().not_null())
                        .col(ColumnDef::new(Warehouses::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(ColumnDef::new(Products::Category).string().null())
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::UnitOfMeasure)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::UnitPrice)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_product_variants_product")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::ProductId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
        Name,
        Branch,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Description,
        Category,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductVariants {
        Table,
        Id,
        ProductId,
        Name,
        UnitOfMeasure,
        UnitPrice,
        CreatedAt,
    }
}

mod m20240101_000002_create_partner_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_partner_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::TaxId).string().null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::EmailNormalized).string().null())
                        .col(ColumnDef::new(Customers::UserId).big_integer().null())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Customers::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            // NULLs stay distinct, so these enforce uniqueness only among
            // customers that actually carry an email / user link.
            manager
                .create_index(
                    Index::create()
                        .name("uq_customers_email_normalized")
                        .table(Customers::Table)
                        .col(Customers::EmailNormalized)
                        .unique()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("uq_customers_user")
                        .table(Customers::Table)
                        .col(Customers::UserId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Suppliers::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::TaxId).string().null())
                        .col(
                            ColumnDef::new(Suppliers::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Suppliers::ContactName).string().null())
                        .col(ColumnDef::new(Suppliers::ContactEmail).string().null())
                        .col(ColumnDef::new(Suppliers::ContactPhone).string().null())
                        .col(ColumnDef::new(Suppliers::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Suppliers::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SupplierProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierProducts::SupplierId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(SupplierProducts::SupplierId)
                                .col(SupplierProducts::ProductId),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupplierProducts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        Name,
        TaxId,
        Email,
        EmailNormalized,
        UserId,
        Phone,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        Name,
        TaxId,
        Active,
        ContactName,
        ContactEmail,
        ContactPhone,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SupplierProducts {
        Table,
        SupplierId,
        ProductId,
    }
}

mod m20240101_000003_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBalances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBalances::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::AverageCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_stock_balances_variant_warehouse")
                        .table(StockBalances::Table)
                        .col(StockBalances::VariantId)
                        .col(StockBalances::WarehouseId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Kind).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::UnitCost)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::ActorId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_movements_variant_warehouse")
                        .table(StockMovements::Table)
                        .col(StockMovements::VariantId)
                        .col(StockMovements::WarehouseId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockAdjustments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAdjustments::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockAdjustments::BatchId).uuid().not_null())
                        .col(ColumnDef::new(StockAdjustments::Reason).string().not_null())
                        .col(
                            ColumnDef::new(StockAdjustments::ActorId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockAdjustmentItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAdjustmentItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentItems::AdjustmentId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentItems::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentItems::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentItems::QuantityBefore)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAdjustmentItems::QuantityAfter)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockTransfers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransfers::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockTransfers::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockTransfers::SourceWarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::DestWarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransfers::Reason).string().not_null())
                        .col(
                            ColumnDef::new(StockTransfers::ActorId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockTransferItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransferItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockTransferItems::TransferId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferItems::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                Table::drop().table(StockTransferItems::Table).to_owned(),
                Table::drop().table(StockTransfers::Table).to_owned(),
                Table::drop().table(StockAdjustmentItems::Table).to_owned(),
                Table::drop().table(StockAdjustments::Table).to_owned(),
                Table::drop().table(StockMovements::Table).to_owned(),
                Table::drop().table(StockBalances::Table).to_owned(),
            ] {
                manager.drop_table(table).await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum StockBalances {
        Table,
        Id,
        VariantId,
        WarehouseId,
        Quantity,
        AverageCost,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        VariantId,
        WarehouseId,
        Kind,
        Quantity,
        UnitCost,
        Reason,
        ActorId,
        BatchId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockAdjustments {
        Table,
        Id,
        BatchId,
        Reason,
        ActorId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockAdjustmentItems {
        Table,
        Id,
        AdjustmentId,
        VariantId,
        WarehouseId,
        QuantityBefore,
        QuantityAfter,
    }

    #[derive(DeriveIden)]
    enum StockTransfers {
        Table,
        Id,
        BatchId,
        SourceWarehouseId,
        DestWarehouseId,
        Reason,
        ActorId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockTransferItems {
        Table,
        Id,
        TransferId,
        VariantId,
        Quantity,
    }
}

mod m20240101_000004_create_purchase_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_purchase_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::SupplierId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::SupplierInvoiceNumber)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::RejectionReason)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SentAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::InvoicedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::ClosedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_purchase_orders_supplier")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitPrice)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_purchase_order_items_order")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::PurchaseOrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        SupplierId,
        Status,
        WarehouseId,
        SupplierInvoiceNumber,
        Notes,
        RejectionReason,
        CreatedAt,
        SentAt,
        ConfirmedAt,
        ReceivedAt,
        InvoicedAt,
        ClosedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        VariantId,
        Quantity,
        UnitPrice,
    }
}

mod m20240101_000005_create_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::CustomerId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::PaymentMethod)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::DeliveryAddress).string().null())
                        .col(ColumnDef::new(SalesOrders::PickupBranch).string().null())
                        .col(
                            ColumnDef::new(SalesOrders::CourierUserId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::RecipientName).string().null())
                        .col(ColumnDef::new(SalesOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(SalesOrders::CancellationReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(SalesOrders::PaidAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::PreparedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::ShippedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::ReadyAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::DeliveredAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::PickedUpAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::CancelledAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(SalesOrders::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_orders_customer")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::SalesOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::Discount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_order_items_order")
                        .table(SalesOrderItems::Table)
                        .col(SalesOrderItems::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum SalesOrders {
        Table,
        Id,
        CustomerId,
        Status,
        PaymentMethod,
        WarehouseId,
        DeliveryAddress,
        PickupBranch,
        CourierUserId,
        RecipientName,
        Notes,
        CancellationReason,
        CreatedAt,
        PaidAt,
        PreparedAt,
        ShippedAt,
        ReadyAt,
        DeliveredAt,
        PickedUpAt,
        CancelledAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderItems {
        Table,
        Id,
        SalesOrderId,
        VariantId,
        Quantity,
        UnitPrice,
        Discount,
    }
}

mod m20240101_000006_create_reservation_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_reservation_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Reservations::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Reservations::CustomerId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reservations::Status).string().not_null())
                        .col(ColumnDef::new(Reservations::ReserveAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Reservations::Notes).string().null())
                        .col(
                            ColumnDef::new(Reservations::DepositAmount)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(Reservations::DepositMethod).string().null())
                        .col(ColumnDef::new(Reservations::DepositReceipt).string().null())
                        .col(ColumnDef::new(Reservations::DepositAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Reservations::ConfirmedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Reservations::ReminderAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Reservations::SalesOrderId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Reservations::CancellationReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Reservations::CancelledAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Reservations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reservations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_reservations_status")
                        .table(Reservations::Table)
                        .col(Reservations::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReservationItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReservationItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::ReservationId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::VariantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_reservation_items_variant")
                        .table(ReservationItems::Table)
                        .col(ReservationItems::VariantId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReservationItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Reservations::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Reservations {
        Table,
        Id,
        CustomerId,
        Status,
        ReserveAt,
        Notes,
        DepositAmount,
        DepositMethod,
        DepositReceipt,
        DepositAt,
        ConfirmedAt,
        ReminderAt,
        SalesOrderId,
        CancellationReason,
        CancelledAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ReservationItems {
        Table,
        Id,
        ReservationId,
        VariantId,
        Quantity,
    }
}

mod m20240101_000007_create_invoicing_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_invoicing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Invoices::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Invoices::Number).string().not_null())
                        .col(ColumnDef::new(Invoices::SalesOrderId).big_integer().null())
                        .col(
                            ColumnDef::new(Invoices::CustomerId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::TaxId).string().null())
                        .col(ColumnDef::new(Invoices::LegalName).string().null())
                        .col(ColumnDef::new(Invoices::IssuedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Invoices::DueAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Invoices::Subtotal)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::Discount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::Tax).decimal_len(19, 4).not_null())
                        .col(
                            ColumnDef::new(Invoices::Total)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(ColumnDef::new(Invoices::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_invoices_number")
                        .table(Invoices::Table)
                        .col(Invoices::Number)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InvoiceItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InvoiceItems::InvoiceId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceItems::VariantId).big_integer().null())
                        .col(
                            ColumnDef::new(InvoiceItems::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceItems::Discount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InvoiceItems::Subtotal)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_invoice_items_invoice")
                        .table(InvoiceItems::Table)
                        .col(InvoiceItems::InvoiceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Payments::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Payments::CustomerId).big_integer().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).big_integer().null())
                        .col(ColumnDef::new(Payments::SalesOrderId).big_integer().null())
                        .col(
                            ColumnDef::new(Payments::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(ColumnDef::new(Payments::Receipt).string().null())
                        .col(ColumnDef::new(Payments::PaidAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Payments::Status).string().not_null())
                        .col(ColumnDef::new(Payments::ActorId).big_integer().not_null())
                        .col(ColumnDef::new(Payments::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_payments_invoice")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InvoiceItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        Number,
        SalesOrderId,
        CustomerId,
        TaxId,
        LegalName,
        IssuedAt,
        DueAt,
        Subtotal,
        Discount,
        Tax,
        Total,
        Status,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum InvoiceItems {
        Table,
        Id,
        InvoiceId,
        VariantId,
        Description,
        Quantity,
        UnitPrice,
        Discount,
        Subtotal,
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        CustomerId,
        InvoiceId,
        SalesOrderId,
        Amount,
        Method,
        Receipt,
        PaidAt,
        Status,
        ActorId,
        CreatedAt,
    }
}

mod m20240101_000008_create_idempotency_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_idempotency_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IdempotencyRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IdempotencyRecords::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(IdempotencyRecords::Key).string().not_null())
                        .col(
                            ColumnDef::new(IdempotencyRecords::Route)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::Method)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::BodyHash)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::ResponseStatus)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(IdempotencyRecords::ResponseBody).text().null())
                        .col(
                            ColumnDef::new(IdempotencyRecords::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_idempotency_records_key")
                        .table(IdempotencyRecords::Table)
                        .col(IdempotencyRecords::Key)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IdempotencyRecords::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum IdempotencyRecords {
        Table,
        Id,
        Key,
        Route,
        Method,
        BodyHash,
        ResponseStatus,
        ResponseBody,
        ExpiresAt,
        CreatedAt,
    }
}
