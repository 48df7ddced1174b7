use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use dualmart_catalog::{PriceBracket, PricingError, Product, quote, resolve_price};
use dualmart_core::{Money, PricingTier, ProductId};
use rust_decimal::Decimal;

fn product_with_brackets(count: u32) -> Product {
    let base = Money::from_units(2_000);
    let brackets = (1..=count).map(|i| {
        if i % 2 == 0 {
            PriceBracket::percent_off(i * 10, None, Decimal::from(i.min(90))).unwrap()
        } else {
            PriceBracket::fixed(i * 10, Some(i * 10 + 5), Money::from_units(u64::from(2_000 - i))).unwrap()
        }
    });
    Product::new(ProductId::new(), "Bench", base)
        .unwrap()
        .with_tier_price(PricingTier::Wholesaler, Money::from_units(1_600))
        .with_tier_price(PricingTier::Premium, Money::from_units(1_500))
        .with_brackets(brackets)
        .unwrap()
}

fn bench_resolve_price(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_price");
    for count in [0u32, 4, 32, 128] {
        let product = product_with_brackets(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &product, |b, p| {
            b.iter(|| {
                resolve_price(
                    black_box(p),
                    black_box(Some(PricingTier::Wholesaler)),
                    black_box(count * 10 + 3),
                )
            })
        });
    }
    group.finish();
}

fn bench_quote_cart(c: &mut Criterion) {
    let products: Vec<Product> = (0..50).map(|_| product_with_brackets(8)).collect();
    c.bench_function("quote_cart_50_lines", |b| {
        b.iter(|| {
            products
                .iter()
                .enumerate()
                .try_fold(Money::ZERO, |acc, (i, p)| {
                    let line = quote(p, Some(PricingTier::Premium), i as u32 + 1)?;
                    Ok::<_, PricingError>(acc.checked_add(line.line_total)?)
                })
        })
    });
}

criterion_group!(benches, bench_resolve_price, bench_quote_cart);
criterion_main!(benches);
