//! Diff-driven reconciliation of a live device with its updated descriptor.
//!
//! The branches run in a fixed order and the order matters:
//!
//! 1. nothing changed: no-op;
//! 2. `EMERGENCY_ENABLED`: reserved for emergency devices, accepted and
//!    ignored;
//! 3. `DISABLED`: unregister, or register fresh, and return.  This subsumes
//!    every other change;
//! 4. `JOBS_ENABLED`: schedule or unschedule the daily jobs;
//! 5. pin numbers: stop and rebind the changed line(s);
//! 6. traversal duration (shutters): stop and take the new duration;
//! 7. schedule times: reschedule, unless step 4 already scheduled with the
//!    new times in this call.
//!
//! Both device families share this one function through [`DeviceOps`].

use almue_types::{AlmueError, DeviceId, DeviceKind, DifferenceType, LightingDescriptor, ShutterDescriptor};
use tracing::debug;

use crate::controller::DeviceController;

/// What reconciliation needs to know about one device family.
pub(crate) trait DeviceOps {
    type Descriptor;

    const KIND: DeviceKind;
    /// Flags naming a pin of this family.
    const PIN_FLAGS: DifferenceType;
    /// Flags naming the traversal duration (empty for lightings).
    const TIMING_FLAGS: DifferenceType;
    /// Flags naming a schedule time.
    const TIME_FLAGS: DifferenceType;

    fn id(descriptor: &Self::Descriptor) -> DeviceId;
    fn disabled(descriptor: &Self::Descriptor) -> bool;
    fn jobs_enabled(descriptor: &Self::Descriptor) -> bool;

    fn is_registered(controller: &DeviceController, id: DeviceId) -> bool;
    fn register(controller: &DeviceController, descriptor: &Self::Descriptor) -> Result<(), AlmueError>;
    fn unregister(controller: &DeviceController, id: DeviceId) -> Result<(), AlmueError>;
    fn schedule(controller: &DeviceController, descriptor: &Self::Descriptor) -> Result<(), AlmueError>;
    fn unschedule(controller: &DeviceController, id: DeviceId) -> Result<(), AlmueError>;
    fn reschedule(controller: &DeviceController, descriptor: &Self::Descriptor) -> Result<(), AlmueError>;
    fn rebind_pins(
        controller: &DeviceController,
        diff: DifferenceType,
        descriptor: &Self::Descriptor,
    ) -> Result<(), AlmueError>;
    fn apply_timing(controller: &DeviceController, descriptor: &Self::Descriptor) -> Result<(), AlmueError>;
}

pub(crate) fn reconcile<K: DeviceOps>(
    controller: &DeviceController,
    diff: DifferenceType,
    descriptor: &K::Descriptor,
) -> Result<(), AlmueError> {
    let id = K::id(descriptor);
    if diff.is_none() {
        debug!(kind = %K::KIND, device = id, "update without differences");
        return Ok(());
    }
    if diff.contains(DifferenceType::EMERGENCY_ENABLED) {
        debug!(kind = %K::KIND, device = id, "emergency flag changed; nothing to apply");
        return Ok(());
    }

    let registered = K::is_registered(controller, id);
    if diff.contains(DifferenceType::DISABLED) {
        if !K::disabled(descriptor) {
            return K::register(controller, descriptor);
        }
        if registered {
            K::unregister(controller, id)?;
        }
        return Ok(());
    }
    if !registered {
        if K::disabled(descriptor) {
            debug!(kind = %K::KIND, device = id, "disabled device not live; nothing to reconcile");
            return Ok(());
        }
        return Err(AlmueError::NotRegistered { kind: K::KIND, id });
    }

    let mut scheduled = false;
    if diff.contains(DifferenceType::JOBS_ENABLED) {
        if K::jobs_enabled(descriptor) {
            K::schedule(controller, descriptor)?;
            scheduled = true;
        } else {
            K::unschedule(controller, id)?;
        }
    }
    if diff.intersects(K::PIN_FLAGS) {
        K::rebind_pins(controller, diff, descriptor)?;
    }
    if diff.intersects(K::TIMING_FLAGS) {
        K::apply_timing(controller, descriptor)?;
    }
    if diff.intersects(K::TIME_FLAGS) && K::jobs_enabled(descriptor) && !scheduled {
        K::reschedule(controller, descriptor)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Families
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct ShutterOps;

impl DeviceOps for ShutterOps {
    type Descriptor = ShutterDescriptor;

    const KIND: DeviceKind = DeviceKind::Shutter;
    const PIN_FLAGS: DifferenceType = DifferenceType::OPEN_PIN.union(DifferenceType::CLOSE_PIN);
    const TIMING_FLAGS: DifferenceType = DifferenceType::COMPLETE_WAY_IN_SECONDS;
    const TIME_FLAGS: DifferenceType = DifferenceType::OPEN_TIME.union(DifferenceType::CLOSE_TIME);

    fn id(descriptor: &ShutterDescriptor) -> DeviceId {
        descriptor.id
    }

    fn disabled(descriptor: &ShutterDescriptor) -> bool {
        descriptor.disabled
    }

    fn jobs_enabled(descriptor: &ShutterDescriptor) -> bool {
        descriptor.jobs_enabled
    }

    fn is_registered(controller: &DeviceController, id: DeviceId) -> bool {
        controller.shutters.contains(id)
    }

    fn register(controller: &DeviceController, descriptor: &ShutterDescriptor) -> Result<(), AlmueError> {
        controller.register_shutter(descriptor)
    }

    fn unregister(controller: &DeviceController, id: DeviceId) -> Result<(), AlmueError> {
        controller.unregister_shutter(id)
    }

    fn schedule(controller: &DeviceController, descriptor: &ShutterDescriptor) -> Result<(), AlmueError> {
        controller.schedule_shutter_jobs(descriptor)
    }

    fn unschedule(controller: &DeviceController, id: DeviceId) -> Result<(), AlmueError> {
        controller.unschedule_shutter_jobs(id)
    }

    fn reschedule(controller: &DeviceController, descriptor: &ShutterDescriptor) -> Result<(), AlmueError> {
        controller.reschedule_shutter_jobs(descriptor)
    }

    fn rebind_pins(
        controller: &DeviceController,
        diff: DifferenceType,
        descriptor: &ShutterDescriptor,
    ) -> Result<(), AlmueError> {
        controller.rebind_shutter_pins(diff, descriptor)
    }

    fn apply_timing(controller: &DeviceController, descriptor: &ShutterDescriptor) -> Result<(), AlmueError> {
        controller.set_shutter_complete_way(descriptor)
    }
}

pub(crate) struct LightingOps;

impl DeviceOps for LightingOps {
    type Descriptor = LightingDescriptor;

    const KIND: DeviceKind = DeviceKind::Lighting;
    const PIN_FLAGS: DifferenceType = DifferenceType::SWITCH_PIN;
    const TIMING_FLAGS: DifferenceType = DifferenceType::NONE;
    const TIME_FLAGS: DifferenceType = DifferenceType::ON_TIME.union(DifferenceType::OFF_TIME);

    fn id(descriptor: &LightingDescriptor) -> DeviceId {
        descriptor.id
    }

    fn disabled(descriptor: &LightingDescriptor) -> bool {
        descriptor.disabled
    }

    fn jobs_enabled(descriptor: &LightingDescriptor) -> bool {
        descriptor.jobs_enabled
    }

    fn is_registered(controller: &DeviceController, id: DeviceId) -> bool {
        controller.lightings.contains(id)
    }

    fn register(controller: &DeviceController, descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        controller.register_lighting(descriptor)
    }

    fn unregister(controller: &DeviceController, id: DeviceId) -> Result<(), AlmueError> {
        controller.unregister_lighting(id)
    }

    fn schedule(controller: &DeviceController, descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        controller.schedule_lighting_jobs(descriptor)
    }

    fn unschedule(controller: &DeviceController, id: DeviceId) -> Result<(), AlmueError> {
        controller.unschedule_lighting_jobs(id)
    }

    fn reschedule(controller: &DeviceController, descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        controller.reschedule_lighting_jobs(descriptor)
    }

    fn rebind_pins(
        controller: &DeviceController,
        _diff: DifferenceType,
        descriptor: &LightingDescriptor,
    ) -> Result<(), AlmueError> {
        controller.rebind_lighting_pin(descriptor)
    }

    fn apply_timing(_controller: &DeviceController, _descriptor: &LightingDescriptor) -> Result<(), AlmueError> {
        Ok(())
    }
}
