use std::net::IpAddr;

use k8s_openapi::api::core::v1::Service;
use log::{debug, info, warn};

use crate::{
    document::{AddressPool, ConfigFile},
    kubernetes::{assigned_address, is_load_balancer},
    provider::{
        reservation_by_all_tags, reservations_by_any_tags, Reservation, ReservationRequestBuilder,
    },
    tagging::ServiceIdentity,
};

use super::{error::ReconcilerError, ReconcilerContext, UpdateMode};

pub const POOL_PROTOCOL: &str = "bgp";
pub const HOST_PREFIX_LENGTH: u8 = 32;

/// Makes sure every load balancer service has a reserved address mapped into
/// the load balancer configuration, or cleans up after removed ones.
pub async fn reconcile_services(
    services: &[Service],
    mode: UpdateMode,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let services = services
        .iter()
        .filter(|service| is_load_balancer(service))
        .collect::<Vec<_>>();

    info!("Reconciling {} load balancer service(s) ({mode})...", services.len());

    let reservations = context
        .registry
        .list(context.project())
        .await
        .map_err(ReconcilerError::RegistryError)?;

    let original = match &context.document {
        Some(document) => Some(document.load().await?),
        None => None,
    };
    let mut config = original.clone();

    match mode {
        UpdateMode::Add => {
            for service in &services {
                add_service(service, &reservations, config.as_mut(), context).await?;
            }
        }
        UpdateMode::Remove => {
            remove_services(&services, &reservations, config.as_mut(), context).await?;
        }
        UpdateMode::Sync => {
            return sync_services(&services, &reservations, original, config, context).await;
        }
    }

    save_if_changed(context, &original, &config).await
}

/// Ensures the service has an address, reserving one if needed, and maps the
/// address into a pool named after the service.
///
/// Returns the mapped `address/prefix`, or `None` when no address could be
/// obtained in this pass.
pub async fn add_service(
    service: &Service,
    reservations: &[Reservation],
    config: Option<&mut ConfigFile>,
    context: &ReconcilerContext,
) -> Result<Option<String>, ReconcilerError> {
    let identity = ServiceIdentity::of(service).ok_or(ReconcilerError::MissingObjectMetadata)?;
    let service_name = identity.rep();
    let service_tag = identity.tag();
    let owned = reservation_by_all_tags(&[service_tag.as_str(), context.provider_tag()], reservations);

    let (address, prefix_length) = match assigned_address(service) {
        Some(address) => {
            debug!("Service '{service_name}' already has address {address}");

            let prefix_length = owned
                .filter(|reservation| address.parse::<IpAddr>().ok() == Some(reservation.address))
                .map_or(HOST_PREFIX_LENGTH, |reservation| reservation.prefix_length);

            (address.to_owned(), prefix_length)
        }
        None => {
            let reservation = match owned {
                Some(reservation) => {
                    debug!("Reusing reservation {reservation} for '{service_name}'");
                    reservation.clone()
                }
                None => match request_reservation(&identity, context).await? {
                    Some(reservation) => reservation,
                    None => return Ok(None),
                },
            };

            assign_address(&identity, &reservation, context).await?;

            (reservation.address.to_string(), reservation.prefix_length)
        }
    };

    let cidr = format!("{address}/{prefix_length}");

    if let Some(config) = config {
        let pool = AddressPool {
            name: service_name.to_owned(),
            protocol: POOL_PROTOCOL.to_owned(),
            addresses: vec![cidr.to_owned()],
            auto_assign: Some(false),
            ..Default::default()
        };

        match config.add_address_pool(pool) {
            true => info!("Mapped {cidr} into pool '{service_name}'"),
            false => debug!("{cidr} is already mapped"),
        }
    }

    Ok(Some(cidr))
}

async fn request_reservation(
    identity: &ServiceIdentity,
    context: &ReconcilerContext,
) -> Result<Option<Reservation>, ReconcilerError> {
    let request = ReservationRequestBuilder::default()
        .facility(context.settings.facility.to_owned())
        .tags(vec![context.provider_tag().to_owned(), identity.tag()])
        .build()
        .map_err(ReconcilerError::InvalidReservationRequest)?;

    info!("Requesting an address for '{}'...", identity.rep());

    match context.registry.create(context.project(), &request).await {
        Ok(reservation) => {
            info!("Reserved {reservation} for '{}'", identity.rep());
            Ok(Some(reservation))
        }
        Err(err) => {
            warn!(
                "Couldn't reserve an address for '{}', will retry on the next pass! Reason: {err}",
                identity.rep()
            );
            Ok(None)
        }
    }
}

async fn assign_address(
    identity: &ServiceIdentity,
    reservation: &Reservation,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let mut latest = context
        .services
        .get(&identity.namespace, &identity.name)
        .await
        .map_err(ReconcilerError::ServiceStoreError)?;

    latest
        .spec
        .get_or_insert_with(Default::default)
        .load_balancer_ip = Some(reservation.address.to_string());

    context
        .services
        .update(&latest)
        .await
        .map_err(ReconcilerError::ServiceStoreError)?;

    info!("Assigned {} to '{}'", reservation.address, identity.rep());

    Ok(())
}

async fn remove_services(
    services: &[&Service],
    reservations: &[Reservation],
    mut config: Option<&mut ConfigFile>,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    for service in services {
        let identity =
            ServiceIdentity::of(service).ok_or(ReconcilerError::MissingObjectMetadata)?;
        let service_tag = identity.tag();

        let Some(reservation) =
            reservation_by_all_tags(&[service_tag.as_str(), context.provider_tag()], reservations)
        else {
            debug!("No reservation found for '{}', nothing to clean up", identity.rep());
            continue;
        };

        if let Err(err) = context.registry.delete(&reservation.id).await {
            warn!("Couldn't delete reservation {reservation}! Reason: {err}");
            continue;
        }

        info!("Deleted reservation {reservation} of '{}'", identity.rep());

        if let Some(config) = config.as_deref_mut() {
            config.remove_address_pool_by_address(&reservation.cidr());
        }
    }

    Ok(())
}

async fn sync_services(
    services: &[&Service],
    reservations: &[Reservation],
    original: Option<ConfigFile>,
    mut config: Option<ConfigFile>,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let mut valid_addresses = Vec::new();

    for service in services {
        if let Some(cidr) = add_service(service, reservations, config.as_mut(), context).await? {
            valid_addresses.push(cidr);
        }
    }

    // the additions above may have created reservations
    let reservations = context
        .registry
        .list(context.project())
        .await
        .map_err(ReconcilerError::RegistryError)?;

    let valid_tags = services
        .iter()
        .filter_map(|service| ServiceIdentity::of(service))
        .map(|identity| identity.tag())
        .collect::<Vec<_>>();

    debug!("Valid service tags: {valid_tags:?}");
    debug!("Valid addresses: {valid_addresses:?}");

    if let Some(config) = config.as_mut() {
        for address in config.pool_addresses() {
            if !valid_addresses.contains(&address) {
                info!("Unmapping stale address {address}");
                config.remove_address_pool_by_address(&address);
            }
        }
    }

    save_if_changed(context, &original, &config).await?;

    let valid_tags = valid_tags.iter().map(String::as_str).collect::<Vec<_>>();

    for reservation in reservations_by_any_tags(&[context.provider_tag()], &reservations) {
        if reservation.has_any_tag(&valid_tags) {
            continue;
        }

        match context.registry.delete(&reservation.id).await {
            Ok(()) => info!("Deleted orphaned reservation {reservation}"),
            Err(err) => warn!("Couldn't delete orphaned reservation {reservation}! Reason: {err}"),
        }
    }

    Ok(())
}

async fn save_if_changed(
    context: &ReconcilerContext,
    original: &Option<ConfigFile>,
    config: &Option<ConfigFile>,
) -> Result<(), ReconcilerError> {
    let (Some(document), Some(config)) = (&context.document, config) else {
        return Ok(());
    };

    if original.as_ref() == Some(config) {
        debug!("Address pools unchanged, skipping the update...");
        return Ok(());
    }

    document.save(config).await?;

    Ok(())
}
