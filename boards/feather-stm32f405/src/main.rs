#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod adc;
mod clock;
mod config;
mod credentials;
mod device_id;
mod eth;
mod network;
mod session_buffers;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use defmt::info;
    use embassy_futures::join::join3;
    use embassy_stm32::adc::{Adc, AdcChannel};
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, Pull, Speed};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode};
    use embassy_stm32::rng::Rng;
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use meter_core::{Device, DeviceParts, LoggingControlHandler};

    type Peri<T> = embassy_stm32::Peri<'static, T>;

    struct NetworkPeripherals {
        spi: Peri<peripherals::SPI2>,
        sck: Peri<peripherals::PB13>,
        mosi: Peri<peripherals::PB15>,
        miso: Peri<peripherals::PB14>,
        cs: Peri<peripherals::PC6>,
        reset: Peri<peripherals::PC3>,
        int: Peri<peripherals::PC2>,
        exti: Peri<peripherals::EXTI2>,
        dma_tx: Peri<peripherals::DMA1_CH4>,
        dma_rx: Peri<peripherals::DMA1_CH3>,
    }

    struct SensorPeripherals {
        adc: Peri<peripherals::ADC1>,
        /// A0 on the Feather header
        probe: Peri<peripherals::PA4>,
    }

    embassy_stm32::bind_interrupts!(struct RngIrqs {
        RNG => embassy_stm32::rng::InterruptHandler<peripherals::RNG>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        led: Output<'static>,
    }

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("Energy meter starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE (12 MHz) / 6 = 2 MHz PLL input, x168 = 336 MHz VCO
        // VCO / 4 = 84 MHz SYSCLK, VCO / 7 = 48 MHz for the RNG
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        let p = embassy_stm32::init(config);

        // TIM2 on APB1: timer clock = 2 * APB1 = 84 MHz
        Mono::start(84_000_000);
        info!("SYSCLK 84 MHz, TIM2 monotonic at 1 MHz");

        let led = Output::new(p.PC1, Level::High, Speed::Low);

        let net_periph = NetworkPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
        };
        let sensor_periph = SensorPeripherals {
            adc: p.ADC1,
            probe: p.PA4,
        };

        heartbeat::spawn().ok();
        meter_task::spawn(net_periph, sensor_periph, p.RNG).ok();

        (Shared {}, Local { led })
    }

    #[task(priority = 1, local = [led])]
    async fn heartbeat(cx: heartbeat::Context) {
        loop {
            cx.local.led.set_high();
            Mono::delay(100.millis()).await;
            cx.local.led.set_low();
            Mono::delay(4900.millis()).await;
        }
    }

    /// Network stack runners plus the measurement loop
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1)]
    async fn meter_task(
        _cx: meter_task::Context,
        net: NetworkPeripherals,
        sensor: SensorPeripherals,
        rng_periph: Peri<peripherals::RNG>,
    ) {
        use embassy_net::StackResources;
        use static_cell::StaticCell;

        let net_config = config::NetworkConfig::default();

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000); // 10 MHz for W5500

        let spi = Spi::new(
            net.spi,
            net.sck,
            net.mosi,
            net.miso,
            net.dma_tx,
            net.dma_rx,
            spi_config,
        );
        let eth_periph = eth::EthPeripherals {
            spi,
            cs: Output::new(net.cs, Level::High, Speed::VeryHigh),
            reset: Output::new(net.reset, Level::High, Speed::Low),
            int: ExtiInput::new(net.int, net.exti, Pull::Up),
        };

        let (eth_device, w5500_runner) = match eth::init_w5500(eth_periph, net_config.mac_addr).await {
            Ok(parts) => parts,
            Err(e) => defmt::panic!("Ethernet bring-up failed: {}", e),
        };

        static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            eth_device,
            embassy_net::Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );

        let client_id = device_id::client_id();
        info!("Client id: {}", client_id);

        let parts = DeviceParts {
            adc: adc::CurrentProbe::new(Adc::new(sensor.adc), sensor.probe.degrade_adc()),
            clock: clock::MonoClock,
            delay: clock::MonoDelay,
            link: network::EthLink::new(stack),
            time_source: network::SntpTimeSource::new(stack, config::SntpConfig::default()),
            session: network::MqttSession::new(
                stack,
                Rng::new(rng_periph, RngIrqs),
                config::MqttConfig::default(),
            ),
            control: LoggingControlHandler::new(),
            credentials: credentials::CREDENTIALS,
        };
        let mut device = match Device::new(parts, config::device_config(client_id)) {
            Ok(device) => device,
            Err(e) => defmt::panic!("Invalid device configuration: {}", e),
        };

        let app_logic = async {
            device.run().await;
        };

        join3(w5500_runner.run(), net_runner.run(), app_logic).await;
    }

    /// WFI sleep when no task is ready
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}
